//! Identifier primitives shared by the call client crates: principals and the
//! canister ids that address call targets.
mod canister_id;
mod principal_id;

pub use canister_id::{CanisterId, CanisterIdError};
pub use principal_id::{PrincipalId, PrincipalIdError};
