//! Verification of certificates returned by `read_state` requests and by
//! synchronous update calls.
//!
//! A certificate is a [`MixedHashTree`] together with a threshold signature
//! over its root digest. The signature is made either by the root subnet or,
//! when the certificate carries a delegation, by a subnet whose key and
//! canister ranges are themselves certified by the root subnet.
//!
//! The only way to read leaves out of a certificate is through a
//! [`VerifiedCertificate`], which can only be obtained from
//! [`verify_certificate`].
use ic_call_base_types::{CanisterId, PrincipalId};
use ic_call_tree_hash::{Digest, Label, LookupResult, MixedHashTree};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod public_key;
mod signature;
#[cfg(test)]
mod tests;

pub use public_key::{KeyDecodingError, ThresholdSigPublicKey, PUBLIC_KEY_SIZE};
pub use signature::{
    BlsSignatureVerifier, SignatureVerificationError, SignatureVerifier, BLS_SIGNATURE_DST,
    SIGNATURE_SIZE,
};

/// Prefix of the message signed by a subnet: the length-prefixed domain
/// `ic-state-root`, followed by the root digest of the tree.
pub const IC_STATE_ROOT_DOMAIN_SEPARATOR: &[u8; 14] = b"\x0Dic-state-root";

/// A certificate may carry at most this many levels of delegation.
const MAX_DELEGATION_DEPTH: usize = 1;

/// A certificate as found on the wire, before any verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub tree: MixedHashTree,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<CertificateDelegation>,
}

/// Delegates signing authority from the root subnet to `subnet_id`.
/// `certificate` is a CBOR encoded [`Certificate`] signed by the root subnet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDelegation {
    pub subnet_id: PrincipalId,
    #[serde(with = "serde_bytes")]
    pub certificate: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CertificateValidationError {
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
    #[error("invalid delegation: {0}")]
    DelegationInvalid(String),
    #[error("invalid certificate signature: {0}")]
    SignatureInvalid(#[from] SignatureVerificationError),
}

/// A certificate whose signature (and delegation, if any) has been checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCertificate {
    tree: MixedHashTree,
    signer: Option<PrincipalId>,
}

impl VerifiedCertificate {
    /// Resolves `path` in the certified tree.
    pub fn lookup<P: AsRef<[Label]>>(&self, path: P) -> LookupResult<'_> {
        self.tree.lookup(path)
    }

    pub fn tree(&self) -> &MixedHashTree {
        &self.tree
    }

    /// The subnet that signed the certificate, or `None` if it was signed by
    /// the root subnet directly.
    pub fn signing_subnet(&self) -> Option<PrincipalId> {
        self.signer
    }
}

/// The bytes a subnet signs to certify a tree with the given root digest.
pub fn state_root_message(root_digest: &Digest) -> Vec<u8> {
    let mut message = Vec::with_capacity(IC_STATE_ROOT_DOMAIN_SEPARATOR.len() + 32);
    message.extend_from_slice(IC_STATE_ROOT_DOMAIN_SEPARATOR);
    message.extend_from_slice(root_digest.as_bytes());
    message
}

/// Decodes and verifies `certificate` for a request addressed to
/// `canister_id`.
///
/// Delegations are verified against `root_key`, and `canister_id` must lie
/// within one of the canister ranges certified for the delegated subnet.
pub fn verify_certificate(
    certificate: &[u8],
    canister_id: &CanisterId,
    root_key: &ThresholdSigPublicKey,
    verifier: &dyn SignatureVerifier,
) -> Result<VerifiedCertificate, CertificateValidationError> {
    verify_certificate_at_depth(certificate, canister_id, root_key, verifier, 0)
}

fn verify_certificate_at_depth(
    certificate: &[u8],
    canister_id: &CanisterId,
    root_key: &ThresholdSigPublicKey,
    verifier: &dyn SignatureVerifier,
    depth: usize,
) -> Result<VerifiedCertificate, CertificateValidationError> {
    let certificate: Certificate = serde_cbor::from_slice(certificate)
        .map_err(|err| CertificateValidationError::MalformedCertificate(err.to_string()))?;

    let (signing_key, signer) = match &certificate.delegation {
        None => (*root_key, None),
        Some(_) if depth >= MAX_DELEGATION_DEPTH => {
            return Err(CertificateValidationError::DelegationInvalid(
                "a delegation certificate must not carry another delegation".to_string(),
            ));
        }
        Some(delegation) => (
            verify_delegation(delegation, canister_id, root_key, verifier, depth)?,
            Some(delegation.subnet_id),
        ),
    };

    verifier.verify(
        &signing_key,
        &state_root_message(&certificate.tree.digest()),
        &certificate.signature,
    )?;

    Ok(VerifiedCertificate {
        tree: certificate.tree,
        signer,
    })
}

// Verifies the certificate inside `delegation` and returns the public key it
// certifies for the delegated subnet.
fn verify_delegation(
    delegation: &CertificateDelegation,
    canister_id: &CanisterId,
    root_key: &ThresholdSigPublicKey,
    verifier: &dyn SignatureVerifier,
    depth: usize,
) -> Result<ThresholdSigPublicKey, CertificateValidationError> {
    let subnet_id = delegation.subnet_id;
    let invalid = |reason: String| {
        CertificateValidationError::DelegationInvalid(format!("subnet {}: {}", subnet_id, reason))
    };

    let parent = verify_certificate_at_depth(
        &delegation.certificate,
        canister_id,
        root_key,
        verifier,
        depth + 1,
    )
    .map_err(|err| match err {
        CertificateValidationError::DelegationInvalid(_) => err,
        other => invalid(format!("the delegation certificate does not verify: {}", other)),
    })?;

    let subnet_label = Label::from(subnet_id.as_slice());
    let public_key = match parent.lookup([
        Label::from("subnet"),
        subnet_label.clone(),
        Label::from("public_key"),
    ]) {
        LookupResult::Found(der) => ThresholdSigPublicKey::from_der(der)
            .map_err(|err| invalid(format!("malformed public key: {}", err)))?,
        other => return Err(invalid(format!("public key lookup returned {:?}", other))),
    };

    let ranges = match parent.lookup([
        Label::from("subnet"),
        subnet_label,
        Label::from("canister_ranges"),
    ]) {
        LookupResult::Found(bytes) => {
            serde_cbor::from_slice::<Vec<(PrincipalId, PrincipalId)>>(bytes)
                .map_err(|err| invalid(format!("malformed canister ranges: {}", err)))?
        }
        other => return Err(invalid(format!("canister ranges lookup returned {:?}", other))),
    };

    let authorized = ranges.iter().any(|(start, end)| {
        canister_id.is_in_range(&CanisterId::from(*start), &CanisterId::from(*end))
    });
    if !authorized {
        return Err(invalid(format!(
            "canister {} is outside of the delegated canister ranges",
            canister_id
        )));
    }

    Ok(public_key)
}
