use super::Candidate;

/// Pick the candidate whose reported duration is closest to `target_ms`.
///
/// The sort is stable, so ties resolve to the first-encountered candidate in
/// concatenation order (plain query variant before the lyrics variant).
/// Duplicate ids surviving the merge are ranked independently; the outcome is
/// unaffected since they carry the same duration delta.
pub fn select_closest(merged: Vec<Candidate>, target_ms: i64) -> Option<Candidate> {
    let mut ranked = merged;
    ranked.sort_by_key(|candidate| (target_ms - candidate.duration_ms).abs());
    ranked.into_iter().next()
}
