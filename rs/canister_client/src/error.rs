use crate::messages::RequestId;
use crate::polling::PollingError;
use ic_call_certification::CertificateValidationError;
use ic_call_error_types::Rejection;
use thiserror::Error;

/// Failures to exchange a request with the endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid url for {endpoint}: {reason}")]
    InvalidUrl { endpoint: String, reason: String },
    #[error("failed to encode request to {endpoint}: {reason}")]
    Encoding { endpoint: String, reason: String },
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("request to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },
    #[error("request to {endpoint} returned HTTP {status}: {}", String::from_utf8_lossy(.body))]
    Http {
        endpoint: String,
        status: u16,
        body: Vec<u8>,
    },
    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

/// The endpoint answered in a way the protocol does not allow.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("request {0} is replied but the certificate holds no reply")]
    ReplyMissing(RequestId),
    #[error("the reply of request {0} was discarded before it could be read")]
    ReplyDiscarded(RequestId),
    #[error("request {request_id} has unexpected status {status:?}")]
    UnexpectedStatus {
        request_id: RequestId,
        status: String,
    },
    #[error("request {request_id} is rejected but the rejection is unreadable: {reason}")]
    MalformedRejection {
        request_id: RequestId,
        reason: String,
    },
}

/// Everything that can end a request issued through the [`Agent`].
///
/// [`Agent`]: crate::Agent
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("the call was rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("certificate verification failed: {0}")]
    Certificate(#[from] CertificateValidationError),
    #[error(transparent)]
    Polling(#[from] PollingError),
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),
}
