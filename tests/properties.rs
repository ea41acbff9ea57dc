//! Property tests for key derivation, thresholds, payouts and index sharding.

use proptest::prelude::*;
use flight_surety::{
    majority_reached, quorum_reached, required_approvals, Address, FlightKey, IndexGenerator,
    PayoutRatio, UNIT,
};

proptest! {
    /// The same (airline, code, timestamp) always yields the same key, and
    /// changing the timestamp yields a different one.
    #[test]
    fn prop_flight_key_is_deterministic(
        label in "[a-z0-9]{1,12}",
        code in "[A-Z]{2}[0-9]{1,4}",
        timestamp in any::<i64>(),
    ) {
        let airline = Address::from_label(&label);
        let first = FlightKey::derive(&airline, &code, timestamp);
        prop_assert_eq!(first, FlightKey::derive(&airline, &code, timestamp));
        prop_assert_ne!(first, FlightKey::derive(&airline, &code, timestamp.wrapping_add(1)));
        prop_assert_eq!(first.to_string().parse::<FlightKey>().ok(), Some(first));
    }

    /// Majority is reached exactly when approvals * 2 >= electorate, and
    /// `required_approvals` is the smallest such count.
    #[test]
    fn prop_majority_threshold(electorate in 1usize..500, approvals in 0usize..500) {
        prop_assert_eq!(majority_reached(approvals, electorate), approvals * 2 >= electorate);
        let required = required_approvals(electorate);
        prop_assert!(majority_reached(required, electorate));
        prop_assert!(required == 0 || !majority_reached(required - 1, electorate));
    }

    #[test]
    fn prop_quorum_is_monotone(count in 0usize..50, threshold in 1usize..10) {
        if quorum_reached(count, threshold) {
            prop_assert!(quorum_reached(count + 1, threshold));
        }
        prop_assert_eq!(quorum_reached(count, threshold), count >= threshold);
    }

    /// Payout is three halves of the premium, rounded down, never below it.
    #[test]
    fn prop_payout_is_three_halves(paid in 0u128..=UNIT) {
        let ratio = PayoutRatio { numerator: 3, denominator: 2 };
        let payout = ratio.apply(paid);
        prop_assert_eq!(payout, paid * 3 / 2);
        prop_assert!(payout >= paid);
        prop_assert!(payout * 2 <= paid * 3);
    }

    /// Every oracle receives three distinct indices inside the domain.
    #[test]
    fn prop_index_triples_are_distinct(
        seed in any::<u64>(),
        domain in 3u8..=40,
        oracles in 1usize..40,
    ) {
        let mut generator = IndexGenerator::new(seed, domain);
        for n in 0..oracles {
            let oracle = Address::from_label(&format!("oracle-{n}"));
            let indices = generator.assign(&oracle, n as u64);
            prop_assert!(indices.iter().all(|&i| i < domain));
            prop_assert_ne!(indices[0], indices[1]);
            prop_assert_ne!(indices[0], indices[2]);
            prop_assert_ne!(indices[1], indices[2]);
        }
    }

    /// Request indices depend only on the seed and the flight.
    #[test]
    fn prop_request_index_is_stable(seed in any::<u64>(), timestamp in any::<i64>()) {
        let flight = FlightKey::derive(&Address::from_label("airline"), "NZ123", timestamp);
        let a = IndexGenerator::new(seed, 10);
        let mut b = IndexGenerator::new(seed, 10);
        b.assign(&Address::from_label("oracle"), 0);
        prop_assert_eq!(a.request_index(&flight), b.request_index(&flight));
        prop_assert!(a.request_index(&flight) < 10);
    }
}
