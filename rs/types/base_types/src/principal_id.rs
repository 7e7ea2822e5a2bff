use ic_principal::{Principal, PrincipalError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha224};
use std::{
    convert::TryFrom,
    error::Error,
    fmt,
    hash::{Hash, Hasher},
};

/// The type representing principals as described in the [interface
/// spec](https://internetcomputer.org/docs/current/references/ic-interface-spec#principal).
///
/// A principal is just a blob that is displayed in a particular way
/// (see <https://internetcomputer.org/docs/current/references/ic-interface-spec#textual-ids>).
///
/// Principals have variable length, bounded by 29 bytes, and are `Copy`.
#[derive(Clone, Copy, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PrincipalId(pub Principal);

impl PartialEq for PrincipalId {
    fn eq(&self, other: &PrincipalId) -> bool {
        self.0 == other.0
    }
}

impl Hash for PrincipalId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let slice = self.0.as_slice();
        slice.len().hash(state);
        let mut array = [0; Self::MAX_LENGTH_IN_BYTES];
        array[..slice.len()].copy_from_slice(slice);
        array.hash(state);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrincipalIdError(pub PrincipalError);

impl Error for PrincipalIdError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

impl fmt::Display for PrincipalIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Principal> for PrincipalId {
    fn from(p: Principal) -> PrincipalId {
        PrincipalId(p)
    }
}

impl From<PrincipalId> for Principal {
    fn from(p: PrincipalId) -> Principal {
        p.0
    }
}

impl PrincipalId {
    pub const MAX_LENGTH_IN_BYTES: usize = 29;
    const HASH_LEN_IN_BYTES: usize = 28;

    const TYPE_OPAQUE: u8 = 0x01;
    const TYPE_SELF_AUTH: u8 = 0x02;
    const TYPE_ANONYMOUS: u8 = 0x04;

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.to_vec()
    }

    /// Opaque ids are used for system-internal ids such as subnets and
    /// canisters.
    pub fn new_opaque(blob: &[u8]) -> Result<Self, PrincipalIdError> {
        let mut bytes = blob.to_vec();
        bytes.push(Self::TYPE_OPAQUE);
        Self::try_from(&bytes[..])
    }

    /// The principal a holder of `pubkey` (DER encoded) authenticates as.
    pub fn new_self_authenticating(pubkey: &[u8]) -> Self {
        let mut id: [u8; 29] = [0; 29];
        id[..Self::HASH_LEN_IN_BYTES].copy_from_slice(&Sha224::digest(pubkey));
        id[Self::HASH_LEN_IN_BYTES] = Self::TYPE_SELF_AUTH;
        PrincipalId(Principal::from_slice(&id))
    }

    pub fn new_anonymous() -> Self {
        PrincipalId(Principal::anonymous())
    }

    pub fn authenticates_for_pubkey(&self, pubkey: &[u8]) -> bool {
        self.is_self_authenticating()
            && Sha224::digest(pubkey).as_slice() == &self.as_slice()[0..Self::HASH_LEN_IN_BYTES]
    }

    pub fn is_self_authenticating(&self) -> bool {
        let blob = self.as_slice();
        blob.len() == Self::HASH_LEN_IN_BYTES + 1 && blob.last() == Some(&Self::TYPE_SELF_AUTH)
    }

    pub fn is_anonymous(&self) -> bool {
        self.as_slice() == [Self::TYPE_ANONYMOUS]
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        PrincipalId(Principal::management_canister())
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PrincipalId> for Vec<u8> {
    fn from(val: PrincipalId) -> Self {
        val.to_vec()
    }
}

/// The [`TryFrom`] trait should only be used when parsing data; fresh ids
/// should be created with the `PrincipalId::new_*` functions.
impl TryFrom<&[u8]> for PrincipalId {
    type Error = PrincipalIdError;

    fn try_from(blob: &[u8]) -> Result<Self, Self::Error> {
        Principal::try_from_slice(blob)
            .map(Self)
            .map_err(PrincipalIdError)
    }
}

impl TryFrom<Vec<u8>> for PrincipalId {
    type Error = PrincipalIdError;

    fn try_from(blob: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(&blob[..])
    }
}

impl AsRef<[u8]> for PrincipalId {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::str::FromStr for PrincipalId {
    type Err = PrincipalIdError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Principal::from_text(input)
            .map(Self)
            .map_err(PrincipalIdError)
    }
}

// On the wire a principal is always its raw blob, regardless of the format.
impl Serialize for PrincipalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(self.as_slice()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PrincipalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let blob = serde_bytes::ByteBuf::deserialize(deserializer)?;
        PrincipalId::try_from(blob.as_slice()).map_err(serde::de::Error::custom)
    }
}
