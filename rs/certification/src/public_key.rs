use std::fmt;
use thiserror::Error;

/// The size of a raw BLS12-381 public key (a compressed G2 point).
pub const PUBLIC_KEY_SIZE: usize = 96;

// DER header of a BLS12-381 G2 public key: SEQUENCE { SEQUENCE { OID
// 1.3.6.1.4.1.44668.5.3.1.2.1, OID 1.3.6.1.4.1.44668.5.3.2.1 }, BIT STRING }.
const DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05,
    0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05, 0x03,
    0x02, 0x01, 0x03, 0x61, 0x00,
];

/// Root public key of the Internet Computer mainnet.
const IC_ROOT_PUBLIC_KEY: [u8; PUBLIC_KEY_SIZE] = [
    0x81, 0x4c, 0x0e, 0x6e, 0xc7, 0x1f, 0xab, 0x58, 0x3b, 0x08, 0xbd, 0x81, 0x37, 0x3c, 0x25, 0x5c,
    0x3c, 0x37, 0x1b, 0x2e, 0x84, 0x86, 0x3c, 0x98, 0xa4, 0xf1, 0xe0, 0x8b, 0x74, 0x23, 0x5d, 0x14,
    0xfb, 0x5d, 0x9c, 0x0c, 0xd5, 0x46, 0xd9, 0x68, 0x5f, 0x91, 0x3a, 0x0c, 0x0b, 0x2c, 0xc5, 0x34,
    0x15, 0x83, 0xbf, 0x4b, 0x43, 0x92, 0xe4, 0x67, 0xdb, 0x96, 0xd6, 0x5b, 0x9b, 0xb4, 0xcb, 0x71,
    0x71, 0x12, 0xf8, 0x47, 0x2e, 0x0d, 0x5a, 0x4d, 0x14, 0x50, 0x5f, 0xfd, 0x74, 0x84, 0xb0, 0x12,
    0x91, 0x09, 0x1c, 0x5f, 0x87, 0xb9, 0x88, 0x83, 0x46, 0x3f, 0x98, 0x09, 0x1a, 0x0b, 0xaa, 0xae,
];

/// A threshold signing public key of a subnet (or of the root subnet).
///
/// Only the length is checked on construction; whether the bytes are a
/// valid curve point is decided by the signature verifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThresholdSigPublicKey([u8; PUBLIC_KEY_SIZE]);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KeyDecodingError {
    #[error("expected {expected} bytes of DER encoded key, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("the DER header does not describe a BLS12-381 public key")]
    UnexpectedHeader,
}

impl ThresholdSigPublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// The key that certifies the state of the mainnet root subnet.
    pub fn ic_root() -> Self {
        Self(IC_ROOT_PUBLIC_KEY)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Decodes a DER encoded `SubjectPublicKeyInfo`.
    pub fn from_der(der: &[u8]) -> Result<Self, KeyDecodingError> {
        if der.len() != DER_PREFIX.len() + PUBLIC_KEY_SIZE {
            return Err(KeyDecodingError::InvalidLength {
                expected: DER_PREFIX.len() + PUBLIC_KEY_SIZE,
                actual: der.len(),
            });
        }
        let (prefix, key) = der.split_at(DER_PREFIX.len());
        if prefix != DER_PREFIX {
            return Err(KeyDecodingError::UnexpectedHeader);
        }
        let mut bytes = [0; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(key);
        Ok(Self(bytes))
    }

    pub fn to_der(&self) -> Vec<u8> {
        let mut der = Vec::with_capacity(DER_PREFIX.len() + PUBLIC_KEY_SIZE);
        der.extend_from_slice(&DER_PREFIX);
        der.extend_from_slice(&self.0);
        der
    }
}

impl fmt::Debug for ThresholdSigPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThresholdSigPublicKey({})", hex::encode(self.0))
    }
}
