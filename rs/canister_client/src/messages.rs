//! Request contents and envelopes of the HTTP interface, and the request id
//! derived from them.
use ic_call_error_types::Rejection;
use ic_call_tree_hash::Path;
use serde::{de::Deserializer, ser::Serializer, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::BTreeMap, convert::TryFrom, fmt};
use thiserror::Error;

/// The length of a [`RequestId`].
pub const EXPECTED_REQUEST_ID_LENGTH: usize = 32;

/// Domain separator prepended to a request id before it gets signed.
pub const DOMAIN_IC_REQUEST: &[u8; 11] = b"\x0Aic-request";

/// Uniquely identifies a request by hashing its content.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct RequestId([u8; EXPECTED_REQUEST_ID_LENGTH]);

impl RequestId {
    pub const fn from_bytes(bytes: [u8; EXPECTED_REQUEST_ID_LENGTH]) -> Self {
        RequestId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; EXPECTED_REQUEST_ID_LENGTH] {
        &self.0
    }

    /// The bytes a sender signs to authenticate the request.
    pub fn signable(&self) -> Vec<u8> {
        let mut signable = Vec::with_capacity(DOMAIN_IC_REQUEST.len() + EXPECTED_REQUEST_ID_LENGTH);
        signable.extend_from_slice(DOMAIN_IC_REQUEST);
        signable.extend_from_slice(&self.0);
        signable
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self)
    }
}

impl AsRef<[u8]> for RequestId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; EXPECTED_REQUEST_ID_LENGTH]> for RequestId {
    fn from(bytes: [u8; EXPECTED_REQUEST_ID_LENGTH]) -> Self {
        RequestId(bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("expected a request id of {expected_length} bytes, got {given_length} bytes")]
pub struct RequestIdError {
    pub given_length: usize,
    pub expected_length: usize,
}

impl TryFrom<&[u8]> for RequestId {
    type Error = RequestIdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; EXPECTED_REQUEST_ID_LENGTH]>::try_from(bytes)
            .map(RequestId)
            .map_err(|_| RequestIdError {
                given_length: bytes.len(),
                expected_length: EXPECTED_REQUEST_ID_LENGTH,
            })
    }
}

/// A byte blob that is CBOR encoded as a byte string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blob(#[serde(with = "serde_bytes")] pub Vec<u8>);

/// A value of a request's content, as far as the request id is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RawHttpRequestVal {
    Bytes(Vec<u8>),
    String(String),
    U64(u64),
    Array(Vec<RawHttpRequestVal>),
}

fn hash_bytes(value: &[u8]) -> [u8; 32] {
    Sha256::digest(value).into()
}

fn hash_u64(value: u64) -> [u8; 32] {
    let mut buf = Vec::with_capacity(10);
    // Writing to a Vec cannot fail.
    let _ = leb128::write::unsigned(&mut buf, value);
    hash_bytes(&buf)
}

// Arrays hash to the hash of the concatenated hashes of their elements.
fn hash_array(elements: &[RawHttpRequestVal]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for element in elements {
        hasher.update(hash_val(element));
    }
    hasher.finalize().into()
}

fn hash_val(val: &RawHttpRequestVal) -> [u8; 32] {
    match val {
        RawHttpRequestVal::String(string) => hash_bytes(string.as_bytes()),
        RawHttpRequestVal::Bytes(bytes) => hash_bytes(bytes),
        RawHttpRequestVal::U64(integer) => hash_u64(*integer),
        RawHttpRequestVal::Array(elements) => hash_array(elements),
    }
}

/// The representation-independent hash of a map: the hash of the sorted
/// concatenations `H(key) · H(value)` of its entries.
pub(crate) fn hash_of_map(map: &BTreeMap<&str, RawHttpRequestVal>) -> RequestId {
    let mut hashes: Vec<Vec<u8>> = map
        .iter()
        .map(|(key, val)| {
            let mut entry = hash_bytes(key.as_bytes()).to_vec();
            entry.extend_from_slice(&hash_val(val));
            entry
        })
        .collect();
    hashes.sort();

    let mut hasher = Sha256::new();
    for hash in hashes {
        hasher.update(hash);
    }
    RequestId(hasher.finalize().into())
}

fn insert_common(
    map: &mut BTreeMap<&str, RawHttpRequestVal>,
    request_type: &str,
    sender: &Blob,
    ingress_expiry: u64,
    nonce: &Option<Blob>,
) {
    map.insert(
        "request_type",
        RawHttpRequestVal::String(request_type.to_string()),
    );
    map.insert("sender", RawHttpRequestVal::Bytes(sender.0.clone()));
    map.insert("ingress_expiry", RawHttpRequestVal::U64(ingress_expiry));
    if let Some(nonce) = nonce {
        map.insert("nonce", RawHttpRequestVal::Bytes(nonce.0.clone()));
    }
}

/// The content of an update call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCanisterUpdate {
    pub canister_id: Blob,
    pub method_name: String,
    pub arg: Blob,
    pub sender: Blob,
    pub ingress_expiry: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Blob>,
}

impl HttpCanisterUpdate {
    pub fn id(&self) -> RequestId {
        let mut map = BTreeMap::new();
        insert_common(&mut map, "call", &self.sender, self.ingress_expiry, &self.nonce);
        map.insert("canister_id", RawHttpRequestVal::Bytes(self.canister_id.0.clone()));
        map.insert("method_name", RawHttpRequestVal::String(self.method_name.clone()));
        map.insert("arg", RawHttpRequestVal::Bytes(self.arg.0.clone()));
        hash_of_map(&map)
    }
}

/// The content of a query call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpUserQuery {
    pub canister_id: Blob,
    pub method_name: String,
    pub arg: Blob,
    pub sender: Blob,
    pub ingress_expiry: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Blob>,
}

impl HttpUserQuery {
    pub fn id(&self) -> RequestId {
        let mut map = BTreeMap::new();
        insert_common(&mut map, "query", &self.sender, self.ingress_expiry, &self.nonce);
        map.insert("canister_id", RawHttpRequestVal::Bytes(self.canister_id.0.clone()));
        map.insert("method_name", RawHttpRequestVal::String(self.method_name.clone()));
        map.insert("arg", RawHttpRequestVal::Bytes(self.arg.0.clone()));
        hash_of_map(&map)
    }
}

/// The content of a `read_state` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpReadState {
    pub sender: Blob,
    pub paths: Vec<Path>,
    pub ingress_expiry: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<Blob>,
}

impl HttpReadState {
    pub fn id(&self) -> RequestId {
        let mut map = BTreeMap::new();
        insert_common(&mut map, "read_state", &self.sender, self.ingress_expiry, &self.nonce);
        map.insert(
            "paths",
            RawHttpRequestVal::Array(
                self.paths
                    .iter()
                    .map(|path| {
                        RawHttpRequestVal::Array(
                            path.labels()
                                .iter()
                                .map(|label| RawHttpRequestVal::Bytes(label.as_bytes().to_vec()))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        );
        hash_of_map(&map)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request_type")]
pub enum HttpCallContent {
    #[serde(rename = "call")]
    Call {
        #[serde(flatten)]
        update: HttpCanisterUpdate,
    },
}

impl HttpCallContent {
    pub fn id(&self) -> RequestId {
        match self {
            HttpCallContent::Call { update } => update.id(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request_type")]
pub enum HttpQueryContent {
    #[serde(rename = "query")]
    Query {
        #[serde(flatten)]
        query: HttpUserQuery,
    },
}

impl HttpQueryContent {
    pub fn id(&self) -> RequestId {
        match self {
            HttpQueryContent::Query { query } => query.id(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request_type")]
pub enum HttpReadStateContent {
    #[serde(rename = "read_state")]
    ReadState {
        #[serde(flatten)]
        read_state: HttpReadState,
    },
}

impl HttpReadStateContent {
    pub fn id(&self) -> RequestId {
        match self {
            HttpReadStateContent::ReadState { read_state } => read_state.id(),
        }
    }
}

/// A request content together with the sender's authentication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestEnvelope<C> {
    pub content: C,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_pubkey: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_sig: Option<Blob>,
}

/// The body of a reply to a query call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HttpQueryResponse {
    Replied {
        reply: HttpQueryResponseReply,
    },
    Rejected {
        reject_code: u64,
        reject_message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpQueryResponseReply {
    pub arg: Blob,
}

/// The body of a non-empty reply to an update call: either a certificate
/// holding the request's status, or a rejection that happened before the
/// call was accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCallResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_code: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl HttpCallResponse {
    /// The rejection carried in the body, if any.
    pub fn rejection(&self) -> Option<Rejection> {
        let reject_message = self.reject_message.as_ref()?;
        let rejection = Rejection::new(self.reject_code.unwrap_or_default(), reject_message);
        Some(match &self.error_code {
            Some(error_code) => rejection.with_error_code(error_code),
            None => rejection,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpReadStateResponse {
    pub certificate: Blob,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaHealthStatus {
    Starting,
    Healthy,
    WaitingForCertifiedState,
    WaitingForRootDelegation,
    CertifiedStateBehind,
}

/// The body of a reply to `api/v2/status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_key: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impl_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_health_status: Option<ReplicaHealthStatus>,
}

// Because serde_bytes cannot be used on `[u8; 32]`, request ids are
// (de)serialized by hand.
impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        RequestId::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}
