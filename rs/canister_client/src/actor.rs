//! Typed calls to the methods of one canister.
//!
//! An [`Actor`] knows the methods a canister exposes and whether each is a
//! query or an update. It encodes the arguments of a call with candid, sends
//! the call through an [`Agent`], polls for the outcome of updates and
//! decodes the reply.
use crate::agent::Agent;
use crate::error::{AgentError, ProtocolViolation, TransportError};
use crate::config::PollingConfig;
use crate::polling::{PollingError, PollingStrategy};
use candid::utils::{ArgumentDecoder, ArgumentEncoder};
use ic_call_base_types::CanisterId;
use ic_call_certification::CertificateValidationError;
use ic_call_error_types::Rejection;
use slog::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CallMode {
    Query,
    CompositeQuery,
    Update,
}

/// What the caller needs to know about a method to call it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub mode: CallMode,
    /// The number of values the method returns.
    pub return_arity: usize,
}

impl MethodSignature {
    pub fn query(return_arity: usize) -> Self {
        Self {
            mode: CallMode::Query,
            return_arity,
        }
    }

    pub fn composite_query(return_arity: usize) -> Self {
        Self {
            mode: CallMode::CompositeQuery,
            return_arity,
        }
    }

    pub fn update(return_arity: usize) -> Self {
        Self {
            mode: CallMode::Update,
            return_arity,
        }
    }
}

/// The outcome of a failed call, as seen by the caller of an [`Actor`].
#[derive(Debug, Error)]
pub enum CallError {
    #[error("canister {canister_id} has no method {method:?}")]
    UnknownMethod {
        canister_id: CanisterId,
        method: String,
    },
    #[error("failed to encode the arguments of {method}: {source}")]
    Encoding { method: String, source: candid::Error },
    #[error("failed to decode the reply of {method}: {source}")]
    Decoding { method: String, source: candid::Error },
    #[error("the call was rejected: {0}")]
    Rejected(Rejection),
    #[error(transparent)]
    Transport(TransportError),
    #[error("certificate verification failed: {0}")]
    Certificate(CertificateValidationError),
    #[error(transparent)]
    Polling(PollingError),
    #[error(transparent)]
    Protocol(ProtocolViolation),
}

impl From<AgentError> for CallError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Transport(err) => CallError::Transport(err),
            AgentError::Rejected(rejection) => CallError::Rejected(rejection),
            AgentError::Certificate(err) => CallError::Certificate(err),
            AgentError::Polling(err) => CallError::Polling(err),
            AgentError::Protocol(err) => CallError::Protocol(err),
        }
    }
}

impl CallError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            CallError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// Whether polling gave up on an update call whose outcome is unknown.
    /// The call may still execute; re-submitting it is up to the caller.
    pub fn is_polling_exhausted(&self) -> bool {
        matches!(self, CallError::Polling(_))
    }
}

type PollingFactory = Arc<dyn Fn() -> Box<dyn PollingStrategy> + Send + Sync>;

/// A handle on the methods of one canister.
#[derive(Clone)]
pub struct Actor {
    agent: Arc<Agent>,
    canister_id: CanisterId,
    effective_canister_id: CanisterId,
    methods: BTreeMap<String, MethodSignature>,
    polling: PollingFactory,
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("canister_id", &self.canister_id)
            .field("effective_canister_id", &self.effective_canister_id)
            .field("methods", &self.methods)
            .finish()
    }
}

impl Actor {
    /// Creates an actor without methods for `canister_id`, which is also
    /// used as the effective canister id of its calls.
    pub fn new(agent: Arc<Agent>, canister_id: CanisterId) -> Self {
        let polling = PollingConfig::default();
        Self {
            agent,
            canister_id,
            effective_canister_id: canister_id,
            methods: BTreeMap::new(),
            polling: Arc::new(move || polling.strategy()),
        }
    }

    pub fn with_method<S: Into<String>>(mut self, name: S, signature: MethodSignature) -> Self {
        self.methods.insert(name.into(), signature);
        self
    }

    pub fn with_methods<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = (S, MethodSignature)>,
        S: Into<String>,
    {
        methods
            .into_iter()
            .fold(self, |actor, (name, signature)| actor.with_method(name, signature))
    }

    /// Routes calls through `effective_canister_id`, e.g. for calls to the
    /// management canister.
    pub fn with_effective_canister_id(mut self, effective_canister_id: CanisterId) -> Self {
        self.effective_canister_id = effective_canister_id;
        self
    }

    /// Polls update calls with a fresh strategy made by `factory` per call.
    pub fn with_polling<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn PollingStrategy> + Send + Sync + 'static,
    {
        self.polling = Arc::new(factory);
        self
    }

    pub fn canister_id(&self) -> CanisterId {
        self.canister_id
    }

    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.get(name)
    }

    /// Calls `method` with candid encoded `args` and decodes its reply.
    pub async fn call<A, R>(&self, method: &str, args: A) -> Result<R, CallError>
    where
        A: ArgumentEncoder,
        R: for<'de> ArgumentDecoder<'de>,
    {
        let arg = candid::encode_args(args).map_err(|source| CallError::Encoding {
            method: method.to_string(),
            source,
        })?;
        let reply = self.call_raw(method, arg).await?;
        candid::decode_args(&reply).map_err(|source| CallError::Decoding {
            method: method.to_string(),
            source,
        })
    }

    /// Calls `method` with an already encoded argument and returns the raw
    /// reply.
    pub async fn call_raw(&self, method: &str, arg: Vec<u8>) -> Result<Vec<u8>, CallError> {
        let signature = *self
            .methods
            .get(method)
            .ok_or_else(|| CallError::UnknownMethod {
                canister_id: self.canister_id,
                method: method.to_string(),
            })?;

        let result = match signature.mode {
            CallMode::Query | CallMode::CompositeQuery => {
                self.agent
                    .query(&self.canister_id, &self.effective_canister_id, method, arg)
                    .await
            }
            CallMode::Update => {
                let mut strategy = (self.polling)();
                self.agent
                    .update(
                        &self.canister_id,
                        &self.effective_canister_id,
                        method,
                        arg,
                        strategy.as_mut(),
                    )
                    .await
            }
        };

        match result {
            Ok(reply) => Ok(reply),
            // A method returning nothing may be replied without a reply.
            Err(AgentError::Protocol(ProtocolViolation::ReplyMissing(request_id)))
                if signature.return_arity == 0 =>
            {
                debug!(
                    self.agent.logger(),
                    "{} replied without a value", method;
                    "request_id" => %request_id
                );
                candid::encode_args(()).map_err(|source| CallError::Encoding {
                    method: method.to_string(),
                    source,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
