//! An in-memory [`Transport`] and helpers to script replica responses.
use crate::error::TransportError;
use crate::http_client::{HttpResponse, Transport};
use crate::messages::{
    Blob, HttpCallContent, HttpCallResponse, HttpReadStateContent, HttpReadStateResponse,
    HttpRequestEnvelope, RequestId,
};
use async_trait::async_trait;
use ic_call_certification::ThresholdSigPublicKey;
use ic_call_certification_test_utils::{CertificateBuilder, SubnetKey};
use ic_call_tree_hash::{Label, Path};
use std::convert::TryFrom;
use std::sync::{Arc, Mutex};

type Responder = Box<dyn Fn(&str, &[u8]) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Records every request and answers it with a responder closure.
pub(crate) struct MockTransport {
    requests: Mutex<Vec<(String, Vec<u8>)>>,
    responder: Responder,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str, &[u8]) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            requests: Mutex::new(vec![]),
            responder: Box::new(responder),
        })
    }

    pub fn requests(&self) -> Vec<(String, Vec<u8>)> {
        self.requests.lock().unwrap().clone()
    }

    /// The number of requests sent to endpoints ending with `suffix`.
    pub fn count(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(endpoint, _)| endpoint.ends_with(suffix))
            .count()
    }

    fn respond(&self, endpoint: &str, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
        let response = (self.responder)(endpoint, &body);
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body));
        response
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        _deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError> {
        self.respond(endpoint, body)
    }

    async fn get(
        &self,
        endpoint: &str,
        _deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError> {
        self.respond(endpoint, vec![])
    }
}

pub(crate) fn root_key() -> SubnetKey {
    SubnetKey::from_seed(11)
}

pub(crate) fn root_public_key() -> ThresholdSigPublicKey {
    ThresholdSigPublicKey::from_bytes(root_key().public_key_bytes())
}

pub(crate) fn respond(status: u16, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse { status, body })
}

pub(crate) fn accepted() -> Result<HttpResponse, TransportError> {
    respond(202, vec![])
}

pub(crate) fn cbor<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_cbor::to_vec(value).unwrap()
}

/// A 200 response carrying `certificate`, as sent for `read_state` requests
/// and synchronously certified calls.
pub(crate) fn certificate_response(certificate: &CertificateBuilder) -> Result<HttpResponse, TransportError> {
    respond(
        200,
        cbor(&HttpReadStateResponse {
            certificate: Blob(certificate.build()),
        }),
    )
}

/// A 200 response to a call rejected before acceptance.
pub(crate) fn call_rejection(code: u64, message: &str) -> Vec<u8> {
    cbor(&HttpCallResponse {
        reject_code: Some(code),
        reject_message: Some(message.to_string()),
        ..HttpCallResponse::default()
    })
}

/// A root-signed certificate holding the given leaves under
/// `request_status/<request_id>`.
pub(crate) fn status_certificate(request_id: &RequestId, leaves: &[(&str, &[u8])]) -> CertificateBuilder {
    leaves.iter().fold(
        CertificateBuilder::new(&root_key()).with_leaf(["time"], vec![0x01]),
        |builder, (leaf, value)| {
            builder.with_leaf(
                [
                    Label::from("request_status"),
                    Label::from(request_id.as_bytes()),
                    Label::from(*leaf),
                ],
                value.to_vec(),
            )
        },
    )
}

pub(crate) fn decode_call(body: &[u8]) -> HttpRequestEnvelope<HttpCallContent> {
    serde_cbor::from_slice(body).unwrap()
}

pub(crate) fn decode_read_state(body: &[u8]) -> HttpRequestEnvelope<HttpReadStateContent> {
    serde_cbor::from_slice(body).unwrap()
}

/// The paths requested by a `read_state` request body.
pub(crate) fn read_state_paths(body: &[u8]) -> Vec<Path> {
    match decode_read_state(body).content {
        HttpReadStateContent::ReadState { read_state } => read_state.paths,
    }
}

/// The request id whose status a `read_state` request body asks for.
pub(crate) fn polled_request_id(body: &[u8]) -> RequestId {
    let paths = read_state_paths(body);
    RequestId::try_from(paths[0].labels()[1].as_bytes()).unwrap()
}
