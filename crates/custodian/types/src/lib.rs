//! Shared data model for the guarded execution runtime.
//!
//! All types here are immutable value records: envelopes, capabilities,
//! decisions, and ledger/audit/memory payload shapes. Nothing in this
//! crate performs I/O or owns mutable state — that belongs to the crates
//! that consume these types.

mod capability;
mod cycle;
mod envelope;
mod error;
mod ledger;
mod session;
mod verification;

pub use capability::{Capability, CapabilityBuilder, ConsentToken};
pub use cycle::{CommitToken, CycleOutcome, CycleRequest};
pub use envelope::{EffectClass, Envelope, PayloadType, Provenance, SourceClass};
pub use error::TypesError;
pub use ledger::{ExecutionResult, LedgerEntry, LedgerPayload};
pub use session::SessionMemoryRecord;
pub use verification::{
    RcConflictSignals, RcConflictWeights, RcState, VerificationRequest, VerificationDecision,
    VerifierReason, VerifierState,
};

/// Action classes in the trusted-store payload-type set, per §3: only an
/// internally-trusted source class may produce them.
pub fn trusted_store_types() -> [PayloadType; 3] {
    [PayloadType::Pol, PayloadType::Id, PayloadType::Caps]
}
