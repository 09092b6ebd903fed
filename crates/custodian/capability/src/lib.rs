//! Capability manifest, admission verifier, and commit-token minting
//! (§4.3-§4.5).

mod commit;
mod error;
mod manifest;
mod verifier;

pub use commit::mint_commit_token;
pub use error::CapabilityError;
pub use manifest::CapabilityManifest;
pub use verifier::{CapabilityVerifier, DEFAULT_RC_HIGH_THRESHOLD};
