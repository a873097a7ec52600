//! Partner selection.
//!
//! Policy is first-eligible-in-queue: scan the pool in insertion order, skip
//! the requester, return the first compatible entry. First come, first
//! served. There is no scoring and no randomness, so results are fully
//! determined by the pool order.
//!
//! Cost is O(pool size) per call. An indexed or sharded matcher would be the
//! replacement if the pool ever grows large enough for that to matter.

use crate::user::{Hints, UserId, WaitingEntry};

/// Pick a partner for `requester` from `pool`.
///
/// Returns `None` if the pool holds nobody but the requester, or if nobody is
/// compatible. Never returns the requester.
pub fn find_partner(pool: &[WaitingEntry], requester: UserId, hints: &Hints) -> Option<UserId> {
    pool.iter()
        .filter(|entry| entry.user != requester)
        .find(|entry| is_compatible(hints, &entry.hints))
        .map(|entry| entry.user)
}

/// Permissive hint compatibility.
///
/// A gender filter on the requester only excludes candidates that recorded a
/// different gender. A missing gender on either side is compatible. Interests
/// never constrain.
pub fn is_compatible(requester: &Hints, candidate: &Hints) -> bool {
    match (requester.gender, candidate.gender) {
        (Some(wanted), Some(recorded)) => wanted == recorded,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::Gender;

    fn entry(id: u64, hints: Hints) -> WaitingEntry {
        WaitingEntry { user: UserId(id), hints }
    }

    #[test]
    fn empty_pool_has_no_match() {
        assert_eq!(find_partner(&[], UserId(1), &Hints::none()), None);
    }

    #[test]
    fn requester_alone_has_no_match() {
        let pool = [entry(1, Hints::none())];
        assert_eq!(find_partner(&pool, UserId(1), &Hints::none()), None);
    }

    #[test]
    fn first_in_queue_wins() {
        let pool = [entry(5, Hints::none()), entry(3, Hints::none()), entry(9, Hints::none())];
        assert_eq!(find_partner(&pool, UserId(1), &Hints::none()), Some(UserId(5)));
    }

    #[test]
    fn requester_is_skipped_wherever_it_sits() {
        let pool = [entry(1, Hints::none()), entry(2, Hints::none())];
        assert_eq!(find_partner(&pool, UserId(1), &Hints::none()), Some(UserId(2)));
    }

    #[test]
    fn gender_filter_skips_mismatched_candidates() {
        let pool = [
            entry(2, Hints::with_gender(Gender::Male)),
            entry(3, Hints::with_gender(Gender::Female)),
        ];
        let wants_female = Hints::with_gender(Gender::Female);
        assert_eq!(find_partner(&pool, UserId(1), &wants_female), Some(UserId(3)));
    }

    #[test]
    fn missing_gender_is_compatible() {
        let pool = [entry(2, Hints::none())];
        let wants_male = Hints::with_gender(Gender::Male);
        assert_eq!(find_partner(&pool, UserId(1), &wants_male), Some(UserId(2)));

        let pool = [entry(2, Hints::with_gender(Gender::Female))];
        assert_eq!(find_partner(&pool, UserId(1), &Hints::none()), Some(UserId(2)));
    }

    #[test]
    fn nobody_compatible() {
        let pool = [entry(2, Hints::with_gender(Gender::Male))];
        let wants_female = Hints::with_gender(Gender::Female);
        assert_eq!(find_partner(&pool, UserId(1), &wants_female), None);
    }

    #[test]
    fn interests_never_constrain() {
        let a = Hints { gender: None, interests: Some("chess".into()) };
        let b = Hints { gender: None, interests: Some("music".into()) };
        assert!(is_compatible(&a, &b));
    }
}
