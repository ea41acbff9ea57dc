//! Threshold predicates shared by airline admission and oracle quorum.
//!
//! Airline admission uses a simple-majority rule over the current electorate
//! with ties resolved in favour of approval.  Oracle resolution uses a fixed
//! count threshold.  Both are kept here so the two protocols agree on
//! rounding.

/// Determines whether `count` independent reports meet a fixed `threshold`.
///
/// # Examples
///
/// ```
/// use flight_surety::consensus::quorum_reached;
///
/// assert!(!quorum_reached(2, 3));
/// assert!(quorum_reached(3, 3));
/// ```
pub fn quorum_reached(count: usize, threshold: usize) -> bool {
    count >= threshold
}

/// Returns true when `approvals` make up at least half of `electorate`.
///
/// # Examples
///
/// ```
/// use flight_surety::consensus::majority_reached;
///
/// // Two of four registered airlines is enough.
/// assert!(majority_reached(2, 4));
/// // Two of five is not.
/// assert!(!majority_reached(2, 5));
/// ```
pub fn majority_reached(approvals: usize, electorate: usize) -> bool {
    approvals.saturating_mul(2) >= electorate
}

/// Smallest approval count satisfying [`majority_reached`] for `electorate`.
pub fn required_approvals(electorate: usize) -> usize {
    electorate.div_ceil(2)
}
