use crate::ThresholdSigPublicKey;
use ic_bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use ic_bls12_381::{pairing, G1Affine, G1Projective, G2Affine};
use thiserror::Error;

/// Domain separation tag of the hash-to-curve suite used for threshold
/// signatures (signatures in G1, public keys in G2).
pub const BLS_SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// The size of a BLS12-381 signature (a compressed G1 point).
pub const SIGNATURE_SIZE: usize = 48;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SignatureVerificationError {
    #[error("the public key is not a valid G2 point")]
    MalformedPublicKey,
    #[error("expected a {SIGNATURE_SIZE} byte G1 point as signature, got {0} bytes")]
    MalformedSignature(usize),
    #[error("the signature does not match the message")]
    Mismatch,
}

/// Checks a signature made by a subnet's threshold key.
///
/// Certificates are verified through this trait so that deployments can
/// swap in a different implementation of the pairing check.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        public_key: &ThresholdSigPublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureVerificationError>;
}

/// Verifies BLS12-381 signatures with `ic_bls12_381`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlsSignatureVerifier;

fn hash_message_to_g1(message: &[u8]) -> G1Affine {
    G1Affine::from(
        <G1Projective as HashToCurve<ExpandMsgXmd<sha2::Sha256>>>::hash_to_curve(
            message,
            BLS_SIGNATURE_DST,
        ),
    )
}

impl SignatureVerifier for BlsSignatureVerifier {
    fn verify(
        &self,
        public_key: &ThresholdSigPublicKey,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureVerificationError> {
        let signature: &[u8; SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| SignatureVerificationError::MalformedSignature(signature.len()))?;
        let signature = Option::<G1Affine>::from(G1Affine::from_compressed(signature))
            .ok_or(SignatureVerificationError::MalformedSignature(SIGNATURE_SIZE))?;
        let public_key = Option::<G2Affine>::from(G2Affine::from_compressed(public_key.as_bytes()))
            .ok_or(SignatureVerificationError::MalformedPublicKey)?;
        if bool::from(public_key.is_identity()) {
            return Err(SignatureVerificationError::MalformedPublicKey);
        }
        if bool::from(signature.is_identity()) {
            return Err(SignatureVerificationError::MalformedSignature(SIGNATURE_SIZE));
        }

        // e(sig, g2) == e(H(m), pk)
        if pairing(&signature, &G2Affine::generator())
            == pairing(&hash_message_to_g1(message), &public_key)
        {
            Ok(())
        } else {
            Err(SignatureVerificationError::Mismatch)
        }
    }
}
