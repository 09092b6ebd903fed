use chrono::Utc;
use custodian_types::{CommitToken, RcState, VerifierState};
use uuid::Uuid;

/// Pure factory: constructs an immutable commit token with a fresh unique
/// id and UTC issued-at (§4.5). No state; the token is never reused.
pub fn mint_commit_token(
    action_class: impl Into<String>,
    trajectory_reference: Option<String>,
    verifier_state: VerifierState,
    rc_state_at_mint: RcState,
    rc_score_snapshot: f64,
) -> CommitToken {
    CommitToken {
        id: Uuid::new_v4(),
        action_class: action_class.into(),
        trajectory_reference,
        verifier_state,
        rc_state_at_mint,
        rc_score_snapshot,
        issued_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_mint_is_unique() {
        let first = mint_commit_token("WRITE_FILE", None, VerifierState::Baseline, RcState::Normal, 0.1);
        let second = mint_commit_token("WRITE_FILE", None, VerifierState::Baseline, RcState::Normal, 0.1);
        assert_ne!(first.id, second.id);
    }
}
