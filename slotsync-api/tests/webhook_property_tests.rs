//! Property tests for webhook authentication and the time-of-day split.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use slotsync_api::{sign_payload, verify_signature, SignatureError, TimePreference};
use slotsync_test_utils::fixtures::{slot_at, RESOURCE};
use slotsync_test_utils::generators::arb_slot_start;
use std::time::Duration;

const KEY: &str = "whsec_property_key";
const MAX_AGE: Duration = Duration::from_secs(180);

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 5, 6, 12, 0, 0).unwrap()
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Flipping any bit of a signed body invalidates the signature.
    #[test]
    fn prop_tampered_body_is_rejected(
        body in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let header = sign_payload(KEY, now().timestamp(), &body).unwrap();
        let mut tampered = body.clone();
        let at = index.index(tampered.len());
        tampered[at] ^= 1 << bit;

        prop_assert_eq!(
            verify_signature(Some(&header), &tampered, KEY, now(), MAX_AGE),
            Err(SignatureError::Mismatch)
        );
    }

    /// Acceptance depends only on how far the signing time is from now.
    #[test]
    fn prop_signature_age_window(
        body in prop::collection::vec(any::<u8>(), 0..128),
        skew in -600i64..600,
    ) {
        let header = sign_payload(KEY, now().timestamp() + skew, &body).unwrap();
        let result = verify_signature(Some(&header), &body, KEY, now(), MAX_AGE);

        if skew.unsigned_abs() <= MAX_AGE.as_secs() {
            prop_assert_eq!(result, Ok(()));
        } else {
            prop_assert!(matches!(result, Err(SignatureError::Expired { .. })), "expected Expired, got {:?}", result);
        }
    }

    /// Every slot is either morning or afternoon, never both, at any offset.
    #[test]
    fn prop_time_preference_partitions_slots(
        start in arb_slot_start(),
        offset in -720i32..=840,
    ) {
        let slot = slot_at(RESOURCE, start);
        let morning = TimePreference::Morning.matches(&slot, offset);
        let afternoon = TimePreference::Afternoon.matches(&slot, offset);

        prop_assert!(morning ^ afternoon);
        prop_assert!(TimePreference::All.matches(&slot, offset));
    }
}
