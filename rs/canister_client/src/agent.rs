//! An agent to talk to canisters through the public HTTP endpoints of a
//! replica.
//!
//! The agent sends queries and update calls, classifies their responses and,
//! for update calls accepted for asynchronous processing, polls the certified
//! request status until the call reaches a terminal state. Every certificate
//! is verified before anything is read out of it.
use crate::{
    config::AgentConfig,
    error::{AgentError, ProtocolViolation, TransportError},
    http_client::{
        call_path, decode_body, ensure_success, query_path, read_state_path, HttpResponse,
        HttpTransport, Transport, NODE_STATUS_PATH,
    },
    messages::{
        Blob, HttpCallContent, HttpCallResponse, HttpCanisterUpdate, HttpQueryContent,
        HttpQueryResponse, HttpReadState, HttpReadStateContent, HttpReadStateResponse,
        HttpRequestEnvelope, HttpStatusResponse, HttpUserQuery, ReplicaHealthStatus, RequestId,
    },
    polling::PollingStrategy,
    request_status::{lookup_request_status, request_status_path, RequestStatus},
    sender::Sender,
};
use ic_call_base_types::CanisterId;
use ic_call_certification::{
    verify_certificate, BlsSignatureVerifier, SignatureVerifier, ThresholdSigPublicKey,
    VerifiedCertificate,
};
use ic_call_error_types::Rejection;
use ic_call_tree_hash::Path;
use serde::Serialize;
use slog::{debug, info, o, warn, Logger};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::time::Instant;

/// How long after its creation a request expires.
pub const DEFAULT_INGRESS_EXPIRY: Duration = Duration::from_secs(4 * 60);

/// Maximum time to wait for the response to a query or `read_state` request.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum time to wait for the response to the submission of an update
/// call. This does not bound the polling that follows.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(60);

/// The immediate outcome of submitting an update call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallResponse {
    /// The call was accepted; its outcome must be polled for.
    Accepted(RequestId),
    /// The replica answered with a certificate already holding the terminal
    /// status of the call.
    Certified(RequestId, RequestStatus),
}

impl CallResponse {
    pub fn request_id(&self) -> &RequestId {
        match self {
            CallResponse::Accepted(request_id) | CallResponse::Certified(request_id, _) => {
                request_id
            }
        }
    }
}

/// An agent to talk to canisters through the public endpoints.
#[derive(Clone)]
pub struct Agent {
    // A single transport is shared by all clones of an agent.
    transport: Arc<dyn Transport>,

    sender: Sender,

    /// The key certificates must ultimately be signed with.
    root_key: ThresholdSigPublicKey,

    verifier: Arc<dyn SignatureVerifier>,

    ingress_expiry: Duration,
    query_timeout: Duration,
    update_timeout: Duration,

    log: Logger,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("sender", &self.sender)
            .field("root_key", &self.root_key)
            .field("ingress_expiry", &self.ingress_expiry)
            .field("query_timeout", &self.query_timeout)
            .field("update_timeout", &self.update_timeout)
            .finish()
    }
}

impl Agent {
    /// Creates an agent sending its requests through `transport` on behalf of
    /// `sender`, trusting the mainnet root key.
    pub fn new(transport: Arc<dyn Transport>, sender: Sender) -> Self {
        Self {
            transport,
            sender,
            root_key: ThresholdSigPublicKey::ic_root(),
            verifier: Arc::new(BlsSignatureVerifier),
            ingress_expiry: DEFAULT_INGRESS_EXPIRY,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            log: Logger::root(slog::Discard, o!()),
        }
    }

    /// Creates an agent talking HTTP to the replica at `config.url`.
    pub fn from_config(config: &AgentConfig, sender: Sender) -> Self {
        Self::new(Arc::new(HttpTransport::new(config.url.clone())), sender)
            .with_ingress_expiry(config.ingress_expiry)
            .with_query_timeout(config.query_timeout)
            .with_update_timeout(config.update_timeout)
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Trusts `root_key` instead of the mainnet root key.
    pub fn with_root_key(mut self, root_key: ThresholdSigPublicKey) -> Self {
        self.root_key = root_key;
        self
    }

    pub fn with_signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_ingress_expiry(mut self, ingress_expiry: Duration) -> Self {
        self.ingress_expiry = ingress_expiry;
        self
    }

    /// Sets the timeout for queries and `read_state` requests.
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn with_update_timeout(mut self, update_timeout: Duration) -> Self {
        self.update_timeout = update_timeout;
        self
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn root_key(&self) -> &ThresholdSigPublicKey {
        &self.root_key
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.log
    }

    /// Calls the query method `method` on `canister_id` and returns the raw
    /// reply. A rejection is returned as [`AgentError::Rejected`].
    pub async fn query(
        &self,
        canister_id: &CanisterId,
        effective_canister_id: &CanisterId,
        method: &str,
        arg: Vec<u8>,
    ) -> Result<Vec<u8>, AgentError> {
        let content = HttpQueryContent::Query {
            query: HttpUserQuery {
                canister_id: Blob(canister_id.get().into_vec()),
                method_name: method.to_string(),
                arg: Blob(arg),
                sender: self.sender_blob(),
                ingress_expiry: self.expiry(),
                nonce: None,
            },
        };
        let request_id = content.id();
        let endpoint = query_path(*effective_canister_id);
        let body = self.sign(&endpoint, content, &request_id)?;
        debug!(
            self.log,
            "sending query";
            "canister_id" => %canister_id,
            "method" => method,
            "request_id" => %request_id
        );

        let response = self
            .transport
            .post(&endpoint, body, Instant::now() + self.query_timeout)
            .await?;
        if !response.is_success() {
            return Err(self.unsuccessful(&endpoint, response));
        }

        match decode_body::<HttpQueryResponse>(&endpoint, &response.body)? {
            HttpQueryResponse::Replied { reply } => Ok(reply.arg.0),
            HttpQueryResponse::Rejected {
                reject_code,
                reject_message,
                error_code,
            } => {
                let rejection = Rejection::new(reject_code, reject_message);
                let rejection = match error_code {
                    Some(error_code) => rejection.with_error_code(error_code),
                    None => rejection,
                };
                Err(self.rejected(&request_id, rejection))
            }
        }
    }

    /// Submits an update call to `method` on `canister_id`.
    ///
    /// Returns as soon as the replica has accepted the call, or with the
    /// terminal status of the call if the replica certified it synchronously.
    /// A call rejected before acceptance is returned as
    /// [`AgentError::Rejected`] and must not be polled for.
    pub async fn call(
        &self,
        canister_id: &CanisterId,
        effective_canister_id: &CanisterId,
        method: &str,
        arg: Vec<u8>,
    ) -> Result<CallResponse, AgentError> {
        let content = HttpCallContent::Call {
            update: HttpCanisterUpdate {
                canister_id: Blob(canister_id.get().into_vec()),
                method_name: method.to_string(),
                arg: Blob(arg),
                sender: self.sender_blob(),
                ingress_expiry: self.expiry(),
                nonce: Some(Blob(rand::random::<[u8; 8]>().to_vec())),
            },
        };
        let request_id = content.id();
        let endpoint = call_path(*effective_canister_id);
        let body = self.sign(&endpoint, content, &request_id)?;
        debug!(
            self.log,
            "sending update call";
            "canister_id" => %canister_id,
            "method" => method,
            "request_id" => %request_id
        );

        let response = self
            .transport
            .post(&endpoint, body, Instant::now() + self.update_timeout)
            .await?;
        if !response.is_success() {
            return Err(self.unsuccessful(&endpoint, response));
        }
        if response.body.is_empty() {
            info!(self.log, "update call accepted"; "request_id" => %request_id);
            return Ok(CallResponse::Accepted(request_id));
        }

        let body = decode_body::<HttpCallResponse>(&endpoint, &response.body)?;
        if let Some(rejection) = body.rejection() {
            return Err(self.rejected(&request_id, rejection));
        }
        let Some(certificate) = body.certificate else {
            info!(self.log, "update call accepted"; "request_id" => %request_id);
            return Ok(CallResponse::Accepted(request_id));
        };

        let certificate = self.verify(&certificate.0, effective_canister_id)?;
        let status = lookup_request_status(&certificate, &request_id)?;
        if status.status().is_pending() {
            info!(
                self.log,
                "update call accepted";
                "request_id" => %request_id,
                "status" => %status.status()
            );
            Ok(CallResponse::Accepted(request_id))
        } else {
            Ok(CallResponse::Certified(request_id, status))
        }
    }

    /// Reads `paths` from the state tree and returns the verified
    /// certificate holding them.
    pub async fn read_state(
        &self,
        effective_canister_id: &CanisterId,
        paths: Vec<Path>,
    ) -> Result<VerifiedCertificate, AgentError> {
        let content = HttpReadStateContent::ReadState {
            read_state: HttpReadState {
                sender: self.sender_blob(),
                paths,
                ingress_expiry: self.expiry(),
                nonce: None,
            },
        };
        let request_id = content.id();
        let endpoint = read_state_path(*effective_canister_id);
        let body = self.sign(&endpoint, content, &request_id)?;

        let response = self
            .transport
            .post(&endpoint, body, Instant::now() + self.query_timeout)
            .await?;
        let response = ensure_success(&endpoint, response)?;
        let response = decode_body::<HttpReadStateResponse>(&endpoint, &response.body)?;
        Ok(self.verify(&response.certificate.0, effective_canister_id)?)
    }

    /// Reads the certified status of `request_id` once.
    pub async fn request_status(
        &self,
        effective_canister_id: &CanisterId,
        request_id: &RequestId,
    ) -> Result<RequestStatus, AgentError> {
        let certificate = self
            .read_state(effective_canister_id, vec![request_status_path(request_id)])
            .await?;
        Ok(lookup_request_status(&certificate, request_id)?)
    }

    /// Polls the status of `request_id` until it is terminal.
    ///
    /// The first read happens immediately; `strategy` is consulted after
    /// every read that finds the call still pending. Verification failures
    /// and transport errors end polling.
    pub async fn wait(
        &self,
        effective_canister_id: &CanisterId,
        request_id: &RequestId,
        strategy: &mut dyn PollingStrategy,
    ) -> Result<Vec<u8>, AgentError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let status = self
                .request_status(effective_canister_id, request_id)
                .await
                .map_err(|err| {
                    warn!(
                        self.log,
                        "polling failed: {}", err;
                        "request_id" => %request_id,
                        "attempt" => attempt
                    );
                    err
                })?;
            debug!(
                self.log,
                "polled request status";
                "request_id" => %request_id,
                "status" => %status.status(),
                "attempt" => attempt
            );

            match status {
                RequestStatus::Replied(reply) => return Ok(reply),
                RequestStatus::Rejected(rejection) => {
                    return Err(self.rejected(request_id, rejection))
                }
                RequestStatus::Done => {
                    warn!(
                        self.log,
                        "the reply was discarded before it was read";
                        "request_id" => %request_id
                    );
                    return Err(ProtocolViolation::ReplyDiscarded(*request_id).into());
                }
                pending => {
                    let wait = strategy
                        .next_wait(effective_canister_id, request_id, pending.status())
                        .map_err(|err| {
                            warn!(
                                self.log,
                                "gave up polling: {}", err;
                                "request_id" => %request_id,
                                "attempt" => attempt
                            );
                            err
                        })?;
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Submits an update call and waits for its reply, polling with
    /// `strategy` if the call was accepted asynchronously.
    pub async fn update(
        &self,
        canister_id: &CanisterId,
        effective_canister_id: &CanisterId,
        method: &str,
        arg: Vec<u8>,
        strategy: &mut dyn PollingStrategy,
    ) -> Result<Vec<u8>, AgentError> {
        match self
            .call(canister_id, effective_canister_id, method, arg)
            .await?
        {
            CallResponse::Certified(_, RequestStatus::Replied(reply)) => Ok(reply),
            CallResponse::Certified(request_id, RequestStatus::Rejected(rejection)) => {
                Err(self.rejected(&request_id, rejection))
            }
            CallResponse::Certified(request_id, RequestStatus::Done) => {
                Err(ProtocolViolation::ReplyDiscarded(request_id).into())
            }
            CallResponse::Certified(request_id, _) | CallResponse::Accepted(request_id) => {
                self.wait(effective_canister_id, &request_id, strategy)
                    .await
            }
        }
    }

    /// Reads the replica's `api/v2/status` endpoint.
    pub async fn status(&self) -> Result<HttpStatusResponse, AgentError> {
        let response = self
            .transport
            .get(NODE_STATUS_PATH, Instant::now() + self.query_timeout)
            .await?;
        let response = ensure_success(NODE_STATUS_PATH, response)?;
        Ok(decode_body(NODE_STATUS_PATH, &response.body)?)
    }

    /// Checks if the target replica is healthy.
    pub async fn is_replica_healthy(&self) -> bool {
        match self.status().await {
            Ok(status) => status.replica_health_status == Some(ReplicaHealthStatus::Healthy),
            Err(_) => false,
        }
    }

    /// Trusts the root key announced by the replica. Only meant for
    /// development replicas, whose keys differ from the mainnet one.
    pub async fn fetch_root_key(&mut self) -> Result<(), AgentError> {
        let malformed = |reason: String| TransportError::MalformedResponse {
            endpoint: NODE_STATUS_PATH.to_string(),
            reason,
        };
        let root_key = self
            .status()
            .await?
            .root_key
            .ok_or_else(|| malformed("the status carries no root key".to_string()))?;
        self.root_key = ThresholdSigPublicKey::from_der(&root_key.0)
            .map_err(|err| malformed(format!("invalid root key: {}", err)))?;
        info!(self.log, "trusting the root key fetched from the replica"; "root_key" => ?self.root_key);
        Ok(())
    }

    fn sender_blob(&self) -> Blob {
        Blob(self.sender.principal_id().into_vec())
    }

    fn expiry(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        (now + self.ingress_expiry).as_nanos() as u64
    }

    // Wraps `content` into an envelope carrying the sender's signature.
    fn sign<C: Serialize>(
        &self,
        endpoint: &str,
        content: C,
        request_id: &RequestId,
    ) -> Result<Vec<u8>, TransportError> {
        let envelope = HttpRequestEnvelope {
            content,
            sender_pubkey: self.sender.sender_pubkey_der().map(Blob),
            sender_sig: self.sender.sign_request_id(request_id).map(Blob),
        };
        serde_cbor::to_vec(&envelope).map_err(|err| TransportError::Encoding {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        })
    }

    fn verify(
        &self,
        certificate: &[u8],
        effective_canister_id: &CanisterId,
    ) -> Result<VerifiedCertificate, AgentError> {
        verify_certificate(
            certificate,
            effective_canister_id,
            &self.root_key,
            self.verifier.as_ref(),
        )
        .map_err(|err| {
            warn!(self.log, "rejecting certificate: {}", err);
            AgentError::Certificate(err)
        })
    }

    fn rejected(&self, request_id: &RequestId, rejection: Rejection) -> AgentError {
        warn!(
            self.log,
            "call rejected: {}", rejection;
            "request_id" => %request_id
        );
        AgentError::Rejected(rejection)
    }

    // A non-2xx response is a rejection if its body says so, and a transport
    // error otherwise.
    fn unsuccessful(&self, endpoint: &str, response: HttpResponse) -> AgentError {
        if let Ok(body) = serde_cbor::from_slice::<HttpCallResponse>(&response.body) {
            if let Some(rejection) = body.rejection() {
                warn!(
                    self.log,
                    "request to {} rejected with HTTP {}: {}", endpoint, response.status, rejection
                );
                return AgentError::Rejected(rejection);
            }
        }
        warn!(self.log, "request to {} failed with HTTP {}", endpoint, response.status);
        AgentError::Transport(TransportError::Http {
            endpoint: endpoint.to_string(),
            status: response.status,
            body: response.body,
        })
    }
}
