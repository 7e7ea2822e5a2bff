//! Rejection types shared by every layer of the call client.
//!
//! A call can be refused by the network in three places: synchronously in
//! the body of a call response, asynchronously in the certified request
//! status, or in the body of a query response. All three are normalized to
//! [`Rejection`].
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};
use strum_macros::EnumIter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TryFromError {
    ValueOutOfRange(u64),
}

/// Reject codes are integers that canisters should pass to msg.reject
/// system API calls. These errors are designed for programmatic error
/// handling, not for end-users. They are also used for classification
/// of user-facing errors.
///
/// See <https://internetcomputer.org/docs/current/references/ic-interface-spec#reject-codes>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
pub enum RejectCode {
    SysFatal = 1,
    SysTransient = 2,
    DestinationInvalid = 3,
    CanisterReject = 4,
    CanisterError = 5,
    SysUnknown = 6,
}

impl RejectCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectCode::SysFatal => "SYS_FATAL",
            RejectCode::SysTransient => "SYS_TRANSIENT",
            RejectCode::DestinationInvalid => "DESTINATION_INVALID",
            RejectCode::CanisterReject => "CANISTER_REJECT",
            RejectCode::CanisterError => "CANISTER_ERROR",
            RejectCode::SysUnknown => "SYS_UNKNOWN",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u64> for RejectCode {
    type Error = TryFromError;
    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(RejectCode::SysFatal),
            2 => Ok(RejectCode::SysTransient),
            3 => Ok(RejectCode::DestinationInvalid),
            4 => Ok(RejectCode::CanisterReject),
            5 => Ok(RejectCode::CanisterError),
            6 => Ok(RejectCode::SysUnknown),
            _ => Err(TryFromError::ValueOutOfRange(code)),
        }
    }
}

/// A protocol-level refusal of a call. Terminal: a rejected call is never
/// retried by the client.
///
/// The code is kept as the raw integer received on the wire so that codes
/// introduced after this client was built still surface unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rejection {
    pub reject_code: u64,
    pub reject_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl Rejection {
    pub fn new<S: ToString>(reject_code: u64, reject_message: S) -> Self {
        Self {
            reject_code,
            reject_message: reject_message.to_string(),
            error_code: None,
        }
    }

    pub fn with_error_code<S: ToString>(mut self, error_code: S) -> Self {
        self.error_code = Some(error_code.to_string());
        self
    }

    /// The classified reject code, if the raw code is a known one.
    pub fn code(&self) -> Option<RejectCode> {
        RejectCode::try_from(self.reject_code).ok()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "reject code {} ({})", self.reject_code, code)?,
            None => write!(f, "reject code {}", self.reject_code)?,
        }
        if let Some(error_code) = &self.error_code {
            write!(f, ", error code {}", error_code)?;
        }
        write!(f, ": {}", self.reject_message)
    }
}

impl std::error::Error for Rejection {}
