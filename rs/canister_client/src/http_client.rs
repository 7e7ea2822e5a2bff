//! The HTTP transport the agent sends its requests through.
use crate::error::TransportError;
use async_trait::async_trait;
use ic_call_base_types::CanisterId;
use serde::de::DeserializeOwned;
use url::Url;

/// The HTTP path for query calls on the replica.
pub fn query_path(effective_canister_id: CanisterId) -> String {
    format!("api/v2/canister/{}/query", effective_canister_id)
}

pub fn read_state_path(effective_canister_id: CanisterId) -> String {
    format!("api/v2/canister/{}/read_state", effective_canister_id)
}

/// The HTTP path for update calls on the replica.
pub fn call_path(effective_canister_id: CanisterId) -> String {
    format!("api/v2/canister/{}/call", effective_canister_id)
}

pub const NODE_STATUS_PATH: &str = "api/v2/status";

/// The status and body of an HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues single HTTP requests against a replica. Implementations must not
/// retry: every call corresponds to exactly one request.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs a CBOR encoded `body` to `endpoint`, a path relative to the
    /// replica's url.
    async fn post(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError>;

    async fn get(
        &self,
        endpoint: &str,
        deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError>;
}

/// A [`Transport`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// Url of the replica to target. This should NOT contain a URL path like
    /// "/api/v2/canister/_/call".
    url: Url,
    // Cloning a reqwest client shares its connection pool.
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: Url) -> Self {
        Self::new_with_client(url, reqwest::Client::new())
    }

    pub fn new_with_client(url: Url, client: reqwest::Client) -> Self {
        Self { url, client }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn build_url(&self, endpoint: &str) -> Result<Url, TransportError> {
        self.url
            .join(endpoint)
            .map_err(|err| TransportError::InvalidUrl {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            })
    }

    async fn send(
        endpoint: &str,
        request: reqwest::RequestBuilder,
        deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError> {
        let timeout = || TransportError::Timeout {
            endpoint: endpoint.to_string(),
        };
        let failed = |err: reqwest::Error| TransportError::Connection {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        };

        let response = tokio::time::timeout_at(deadline, request.send())
            .await
            .map_err(|_| timeout())?
            .map_err(failed)?;
        let status = response.status().as_u16();
        let body = tokio::time::timeout_at(deadline, response.bytes())
            .await
            .map_err(|_| timeout())?
            .map_err(failed)?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError> {
        let url = self.build_url(endpoint)?;
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(body);
        Self::send(endpoint, request, deadline).await
    }

    async fn get(
        &self,
        endpoint: &str,
        deadline: tokio::time::Instant,
    ) -> Result<HttpResponse, TransportError> {
        let url = self.build_url(endpoint)?;
        Self::send(endpoint, self.client.get(url), deadline).await
    }
}

/// Decodes a CBOR response body, reporting undecodable bodies against
/// `endpoint`.
pub(crate) fn decode_body<T: DeserializeOwned>(
    endpoint: &str,
    body: &[u8],
) -> Result<T, TransportError> {
    serde_cbor::from_slice(body).map_err(|err| TransportError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason: format!(
            "{} in body {:?}",
            err,
            String::from_utf8_lossy(
                &body
                    .iter()
                    .copied()
                    .flat_map(std::ascii::escape_default)
                    .collect::<Vec<u8>>()
            )
        ),
    })
}

/// Turns a non-2xx response into an error carrying its status and body.
pub(crate) fn ensure_success(
    endpoint: &str,
    response: HttpResponse,
) -> Result<HttpResponse, TransportError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Http {
            endpoint: endpoint.to_string(),
            status: response.status,
            body: response.body,
        })
    }
}
