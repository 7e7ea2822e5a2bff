//! A client to call canisters via HTTP and to verify the certified outcome
//! of their update calls.
mod actor;
mod agent;
mod config;
mod error;
mod http_client;
mod messages;
mod polling;
mod request_status;
mod sender;
#[cfg(test)]
mod test_utils;

pub use actor::{Actor, CallError, CallMode, MethodSignature};
pub use agent::{
    Agent, CallResponse, DEFAULT_INGRESS_EXPIRY, DEFAULT_QUERY_TIMEOUT, DEFAULT_UPDATE_TIMEOUT,
};
pub use config::{AgentConfig, ConfigError, PollingConfig};
pub use error::{AgentError, ProtocolViolation, TransportError};
pub use http_client::{
    call_path, query_path, read_state_path, HttpResponse, HttpTransport, Transport,
    NODE_STATUS_PATH,
};
pub use messages::{
    Blob, HttpCallContent, HttpCallResponse, HttpCanisterUpdate, HttpQueryContent,
    HttpQueryResponse, HttpQueryResponseReply, HttpReadState, HttpReadStateContent,
    HttpReadStateResponse, HttpRequestEnvelope, HttpStatusResponse, HttpUserQuery,
    ReplicaHealthStatus, RequestId, RequestIdError, DOMAIN_IC_REQUEST,
    EXPECTED_REQUEST_ID_LENGTH,
};
pub use polling::{
    AttemptLimit, Deadline, ExponentialBackoff, OnceThenDelay, PollingError, PollingStrategy,
    Sequence, Throttle,
};
pub use request_status::{lookup_request_status, request_status_path, CallStatus, RequestStatus};
pub use sender::{ed25519_public_key_to_der, Sender, SenderError};

pub use ic_call_base_types::{CanisterId, PrincipalId};
pub use ic_call_certification::{ThresholdSigPublicKey, VerifiedCertificate};
pub use ic_call_error_types::{RejectCode, Rejection};
pub use ic_call_tree_hash::{Label, LookupResult, Path};
