// ─────────────────────────────────────────────────────────────────────
// SCPN UQ Core — Property-Based Tests (proptest) for uq-types
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for uq-types using proptest.
//!
//! Covers: variable-subset algebra, configuration serialization roundtrip.

use proptest::prelude::*;
use uq_types::config::ExpansionConfig;
use uq_types::state::VarSubset;

// ── Variable Subsets ─────────────────────────────────────────────────

proptest! {
    /// A subset and its complement partition the full variable set.
    #[test]
    fn complement_partitions_full_set(num_vars in 1usize..64, bits in any::<u64>()) {
        let full = VarSubset::full(num_vars);
        let s = VarSubset(bits & full.0);
        let c = s.complement(num_vars);

        prop_assert_eq!(s.0 & c.0, 0);
        prop_assert_eq!(s.0 | c.0, full.0);
        prop_assert_eq!(s.len() + c.len(), num_vars);
    }

    /// The support of a multi-index contains exactly its nonzero entries.
    #[test]
    fn support_matches_nonzero_levels(levels in prop::collection::vec(0usize..4, 1..12)) {
        let s = VarSubset::support(&levels);
        for (d, &l) in levels.iter().enumerate() {
            prop_assert_eq!(s.contains(d), l > 0);
        }
        prop_assert_eq!(s.members(levels.len()).len(), s.len());
    }
}

// ── Configuration ────────────────────────────────────────────────────

proptest! {
    /// JSON roundtrip preserves the validated fields.
    #[test]
    fn config_roundtrip(num_vars in 1usize..16, max_level in 1usize..8, all in any::<bool>()) {
        let mut cfg = ExpansionConfig::new(num_vars);
        cfg.max_level = max_level;
        cfg.all_moments = all;
        prop_assert!(cfg.validate().is_ok());

        let json = serde_json::to_string(&cfg).unwrap();
        let back: ExpansionConfig = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.num_vars, num_vars);
        prop_assert_eq!(back.max_level, max_level);
        prop_assert_eq!(back.num_moments(), if all { 4 } else { 2 });
    }
}
