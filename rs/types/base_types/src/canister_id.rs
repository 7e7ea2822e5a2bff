use crate::{PrincipalId, PrincipalIdError};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, str::FromStr};

/// The identifier of a call target.
///
/// Equality and ordering are those of the underlying principal, which is
/// what subnet canister ranges are expressed in.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanisterId(PrincipalId);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CanisterIdError {
    InvalidPrincipalId(PrincipalIdError),
}

impl fmt::Display for CanisterIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPrincipalId(err) => write!(f, "Got an invalid principal id {}", err),
        }
    }
}

impl std::error::Error for CanisterIdError {}

impl CanisterId {
    /// The management canister, `aaaaa-aa`.
    pub fn ic_00() -> Self {
        Self(PrincipalId::default())
    }

    /// Builds the canister id that the system assigns to the `val`-th
    /// canister: the big-endian index followed by the opaque-id markers.
    pub fn from_u64(val: u64) -> Self {
        let mut data = val.to_be_bytes().to_vec();
        data.push(0x01);
        data.push(0x01);
        // 10 bytes are always a valid principal.
        Self(PrincipalId(ic_principal::Principal::from_slice(&data)))
    }

    pub fn get(self) -> PrincipalId {
        self.0
    }

    pub fn get_ref(&self) -> &PrincipalId {
        &self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Whether `self` lies within the inclusive range `[start, end]`.
    pub fn is_in_range(&self, start: &CanisterId, end: &CanisterId) -> bool {
        start <= self && self <= end
    }
}

impl From<PrincipalId> for CanisterId {
    fn from(id: PrincipalId) -> Self {
        Self(id)
    }
}

impl From<CanisterId> for PrincipalId {
    fn from(id: CanisterId) -> Self {
        id.0
    }
}

impl TryFrom<&[u8]> for CanisterId {
    type Error = CanisterIdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        PrincipalId::try_from(bytes)
            .map(Self)
            .map_err(CanisterIdError::InvalidPrincipalId)
    }
}

impl AsRef<[u8]> for CanisterId {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl FromStr for CanisterId {
    type Err = CanisterIdError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        PrincipalId::from_str(input)
            .map(Self)
            .map_err(CanisterIdError::InvalidPrincipalId)
    }
}

impl fmt::Display for CanisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for CanisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanisterId({})", self.0)
    }
}
