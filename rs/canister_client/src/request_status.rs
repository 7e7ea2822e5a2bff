//! Reading the certified status of a request out of a verified certificate.
use crate::error::ProtocolViolation;
use crate::messages::RequestId;
use ic_call_certification::VerifiedCertificate;
use ic_call_error_types::Rejection;
use ic_call_tree_hash::{Label, LookupResult, Path};
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// The status of a request, as stored in the `status` leaf of its
/// `request_status` subtree. `Unknown` stands for a leaf that is not (yet)
/// present.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum CallStatus {
    Received,
    Processing,
    Replied,
    Rejected,
    Done,
    Unknown,
}

impl CallStatus {
    /// Whether polling can still change the outcome of the request.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            CallStatus::Received | CallStatus::Processing | CallStatus::Unknown
        )
    }
}

/// The status of a request together with the data certified for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Unknown,
    Received,
    Processing,
    Replied(Vec<u8>),
    Rejected(Rejection),
    Done,
}

impl RequestStatus {
    pub fn status(&self) -> CallStatus {
        match self {
            RequestStatus::Unknown => CallStatus::Unknown,
            RequestStatus::Received => CallStatus::Received,
            RequestStatus::Processing => CallStatus::Processing,
            RequestStatus::Replied(_) => CallStatus::Replied,
            RequestStatus::Rejected(_) => CallStatus::Rejected,
            RequestStatus::Done => CallStatus::Done,
        }
    }
}

/// The path of the subtree holding everything certified about `request_id`.
pub fn request_status_path(request_id: &RequestId) -> Path {
    Path::new(vec![
        Label::from("request_status"),
        Label::from(request_id.as_bytes()),
    ])
}

fn leaf_path(request_id: &RequestId, leaf: &str) -> Path {
    request_status_path(request_id).join(leaf)
}

/// Decodes the status of `request_id` from a verified certificate.
pub fn lookup_request_status(
    certificate: &VerifiedCertificate,
    request_id: &RequestId,
) -> Result<RequestStatus, ProtocolViolation> {
    let status = match certificate.lookup(leaf_path(request_id, "status")) {
        LookupResult::Found(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            CallStatus::from_str(&text)
                .ok()
                .filter(|status| *status != CallStatus::Unknown)
                .ok_or_else(|| ProtocolViolation::UnexpectedStatus {
                    request_id: *request_id,
                    status: text.into_owned(),
                })?
        }
        LookupResult::Absent | LookupResult::Unknown => CallStatus::Unknown,
        LookupResult::Error => {
            return Err(ProtocolViolation::UnexpectedStatus {
                request_id: *request_id,
                status: "<not a leaf>".to_string(),
            })
        }
    };

    Ok(match status {
        CallStatus::Unknown => RequestStatus::Unknown,
        CallStatus::Received => RequestStatus::Received,
        CallStatus::Processing => RequestStatus::Processing,
        CallStatus::Done => RequestStatus::Done,
        CallStatus::Replied => match certificate.lookup(leaf_path(request_id, "reply")) {
            LookupResult::Found(reply) => RequestStatus::Replied(reply.to_vec()),
            _ => return Err(ProtocolViolation::ReplyMissing(*request_id)),
        },
        CallStatus::Rejected => RequestStatus::Rejected(lookup_rejection(certificate, request_id)?),
    })
}

fn lookup_rejection(
    certificate: &VerifiedCertificate,
    request_id: &RequestId,
) -> Result<Rejection, ProtocolViolation> {
    let malformed = |reason: String| ProtocolViolation::MalformedRejection {
        request_id: *request_id,
        reason,
    };

    let reject_code = match certificate.lookup(leaf_path(request_id, "reject_code")) {
        LookupResult::Found(mut bytes) => leb128::read::unsigned(&mut bytes)
            .map_err(|err| malformed(format!("reject_code is not a natural: {}", err)))?,
        other => return Err(malformed(format!("reject_code lookup returned {:?}", other))),
    };
    let reject_message = match certificate.lookup(leaf_path(request_id, "reject_message")) {
        LookupResult::Found(bytes) => String::from_utf8(bytes.to_vec())
            .map_err(|err| malformed(format!("reject_message is not UTF-8: {}", err)))?,
        other => {
            return Err(malformed(format!(
                "reject_message lookup returned {:?}",
                other
            )))
        }
    };

    let rejection = Rejection::new(reject_code, reject_message);
    Ok(match certificate.lookup(leaf_path(request_id, "error_code")) {
        LookupResult::Found(bytes) => rejection.with_error_code(String::from_utf8_lossy(bytes)),
        _ => rejection,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ic_call_base_types::CanisterId;
    use ic_call_certification::{
        verify_certificate, BlsSignatureVerifier, ThresholdSigPublicKey,
    };
    use ic_call_certification_test_utils::{CertificateBuilder, SubnetKey};

    const REQUEST_ID: RequestId = RequestId::from_bytes([9; 32]);

    fn leaf(name: &str) -> Path {
        leaf_path(&REQUEST_ID, name)
    }

    fn decode(builder: CertificateBuilder) -> Result<RequestStatus, ProtocolViolation> {
        let key = SubnetKey::from_seed(1);
        let root = ThresholdSigPublicKey::from_bytes(key.public_key_bytes());
        let bytes = builder.build();
        let certificate =
            verify_certificate(&bytes, &CanisterId::from_u64(1), &root, &BlsSignatureVerifier)
                .unwrap();
        lookup_request_status(&certificate, &REQUEST_ID)
    }

    fn builder() -> CertificateBuilder {
        CertificateBuilder::new(&SubnetKey::from_seed(1)).with_leaf(["time"], vec![0x01])
    }

    #[test]
    fn parses_status_strings() {
        for (text, status) in [
            ("received", CallStatus::Received),
            ("processing", CallStatus::Processing),
            ("replied", CallStatus::Replied),
            ("rejected", CallStatus::Rejected),
            ("done", CallStatus::Done),
        ] {
            assert_eq!(CallStatus::from_str(text), Ok(status));
            assert_eq!(status.to_string(), text);
        }
        assert!(CallStatus::from_str("Replied").is_err());
    }

    #[test]
    fn missing_status_is_unknown() {
        assert_eq!(decode(builder()), Ok(RequestStatus::Unknown));
    }

    #[test]
    fn pruned_status_is_unknown() {
        let builder = builder()
            .with_leaf(leaf("status"), "replied")
            .with_leaf(leaf("reply"), vec![1])
            .with_pruned(request_status_path(&REQUEST_ID));
        assert_eq!(decode(builder), Ok(RequestStatus::Unknown));
    }

    #[test]
    fn pending_statuses_carry_no_data() {
        assert_eq!(
            decode(builder().with_leaf(leaf("status"), "received")),
            Ok(RequestStatus::Received)
        );
        assert_eq!(
            decode(builder().with_leaf(leaf("status"), "processing")),
            Ok(RequestStatus::Processing)
        );
        assert_eq!(
            decode(builder().with_leaf(leaf("status"), "done")),
            Ok(RequestStatus::Done)
        );
    }

    #[test]
    fn replied_status_returns_reply() {
        let builder = builder()
            .with_leaf(leaf("status"), "replied")
            .with_leaf(leaf("reply"), vec![1, 2]);
        assert_eq!(decode(builder), Ok(RequestStatus::Replied(vec![1, 2])));
    }

    #[test]
    fn replied_status_without_reply_is_a_violation() {
        assert_eq!(
            decode(builder().with_leaf(leaf("status"), "replied")),
            Err(ProtocolViolation::ReplyMissing(REQUEST_ID))
        );
    }

    #[test]
    fn rejected_status_returns_rejection() {
        let builder = builder()
            .with_leaf(leaf("status"), "rejected")
            // LEB128 encoding of 5.
            .with_leaf(leaf("reject_code"), vec![0x05])
            .with_leaf(leaf("reject_message"), "canister trapped")
            .with_leaf(leaf("error_code"), "IC0503");
        assert_eq!(
            decode(builder),
            Ok(RequestStatus::Rejected(
                Rejection::new(5, "canister trapped").with_error_code("IC0503")
            ))
        );
    }

    #[test]
    fn reject_code_is_leb128() {
        let builder = builder()
            .with_leaf(leaf("status"), "rejected")
            .with_leaf(leaf("reject_code"), vec![0xac, 0x02])
            .with_leaf(leaf("reject_message"), "m");
        assert_matches!(
            decode(builder),
            Ok(RequestStatus::Rejected(rejection)) if rejection.reject_code == 300 && rejection.error_code.is_none()
        );
    }

    #[test]
    fn rejection_without_message_is_malformed() {
        let builder = builder()
            .with_leaf(leaf("status"), "rejected")
            .with_leaf(leaf("reject_code"), vec![0x04]);
        assert_matches!(
            decode(builder),
            Err(ProtocolViolation::MalformedRejection { reason, .. }) if reason.contains("reject_message")
        );
    }

    #[test]
    fn unexpected_status_string_is_a_violation() {
        assert_matches!(
            decode(builder().with_leaf(leaf("status"), "unknown")),
            Err(ProtocolViolation::UnexpectedStatus { status, .. }) if status == "unknown"
        );
        assert_matches!(
            decode(builder().with_leaf(leaf("status"), "finished")),
            Err(ProtocolViolation::UnexpectedStatus { .. })
        );
    }

    #[test]
    fn pending_classification() {
        assert!(CallStatus::Unknown.is_pending());
        assert!(CallStatus::Processing.is_pending());
        assert!(!CallStatus::Done.is_pending());
        assert!(!CallStatus::Replied.is_pending());
    }
}
