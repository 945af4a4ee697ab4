//! Property tests for the key lattice, route catalog, and config
//! validation.

use proptest::prelude::*;
use tradepulse_sync::{keys, route_for, KeySegment, QueryKey};
use tradepulse_test_utils::base_config;

fn segment_strategy() -> impl Strategy<Value = KeySegment> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(KeySegment::Text),
        any::<i64>().prop_map(KeySegment::Id),
    ]
}

fn key_strategy() -> impl Strategy<Value = QueryKey> {
    prop::collection::vec(segment_strategy(), 0..5).prop_map(QueryKey::new)
}

proptest! {
    // ========================================================================
    // Prefix lattice
    // ========================================================================

    #[test]
    fn every_key_covers_itself(key in key_strategy()) {
        prop_assert!(key.starts_with(&key));
    }

    #[test]
    fn every_split_point_yields_a_covering_prefix(
        segments in prop::collection::vec(segment_strategy(), 1..6),
        split in 0usize..6,
    ) {
        let split = split.min(segments.len());
        let prefix = QueryKey::new(segments[..split].to_vec());
        let key = QueryKey::new(segments);
        prop_assert!(key.starts_with(&prefix));
    }

    #[test]
    fn mutual_coverage_implies_equality(a in key_strategy(), b in key_strategy()) {
        if a.starts_with(&b) && b.starts_with(&a) {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn extending_a_key_keeps_it_covered(base in key_strategy(), extra in segment_strategy()) {
        let mut segments = base.segments().to_vec();
        segments.push(extra);
        prop_assert!(QueryKey::new(segments).starts_with(&base));
    }

    #[test]
    fn coverage_never_holds_for_longer_prefixes(
        base in key_strategy(),
        extra in segment_strategy(),
    ) {
        let mut segments = base.segments().to_vec();
        segments.push(extra);
        let extended = QueryKey::new(segments);
        prop_assert!(!base.starts_with(&extended));
    }

    #[test]
    fn keys_roundtrip_through_json(key in key_strategy()) {
        let encoded = serde_json::to_string(&key).unwrap();
        let decoded: QueryKey = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(key, decoded);
    }

    // ========================================================================
    // Route catalog
    // ========================================================================

    #[test]
    fn trades_status_filters_route_as_query_params(status in "[a-z]{1,12}") {
        let route = route_for(&keys::trades_with_status(&status)).unwrap();
        prop_assert_eq!(route.path.as_str(), "/api/trades");
        prop_assert_eq!(route.query, vec![("status".to_string(), status)]);
    }

    #[test]
    fn bot_keys_route_to_bot_paths(id in 1i64..1_000_000i64) {
        let route = route_for(&keys::bot(id.into())).unwrap();
        prop_assert_eq!(route.path, format!("/api/bots/{id}"));
        prop_assert!(route.query.is_empty());
    }

    #[test]
    fn job_keys_route_to_job_paths(id in 1i64..1_000_000i64) {
        let route = route_for(&keys::job(id.into())).unwrap();
        prop_assert_eq!(route.path, format!("/api/jobs/{id}"));
    }

    // ========================================================================
    // Config validation
    // ========================================================================

    #[test]
    fn sane_retry_configs_validate(
        max_attempts in 1u32..10,
        initial in 1u64..1_000,
        delta in 0u64..2_000,
        multiplier in 1.0f64..4.0f64,
    ) {
        let mut config = base_config();
        config.retry.max_attempts = max_attempts;
        config.retry.initial_ms = initial;
        config.retry.max_ms = initial + delta;
        config.retry.multiplier = multiplier;
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn shrinking_backoff_multipliers_are_rejected(multiplier in 0.0f64..0.99f64) {
        let mut config = base_config();
        config.reconnect.multiplier = multiplier;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected(initial in 2u64..1_000) {
        let mut config = base_config();
        config.retry.initial_ms = initial;
        config.retry.max_ms = initial - 1;
        prop_assert!(config.validate().is_err());
    }
}
