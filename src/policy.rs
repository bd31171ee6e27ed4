/// Status transitions may only move to an equal or higher `ord`. The UI
/// calls this (over `status.canTransition`) to block and explain a backward
/// move before submitting; the reconciler itself does not re-check it.
pub fn is_forward_transition(current_ord: i64, candidate_ord: i64) -> bool {
    candidate_ord >= current_ord
}
