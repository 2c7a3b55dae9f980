//! Property-based checks over the diff classification function: totality,
//! determinism, and the invariants each status must uphold.

use proptest::prelude::*;

use flowsync_core::models::DiffStatus;
use flowsync_core::reconciliation::classify_diff;

/// Hashes drawn from a small pool so equal/unequal combinations are all
/// exercised often.
fn hash_opt() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        1 => Just(None),
        3 => prop_oneof![Just("h1"), Just("h2"), Just("h3")].prop_map(|s| Some(s.to_string())),
    ]
}

proptest! {
    #[test]
    fn test_classification_is_deterministic(
        sg in hash_opt(),
        tg in hash_opt(),
        se in hash_opt(),
        te in hash_opt(),
    ) {
        let first = classify_diff(sg.as_deref(), tg.as_deref(), se.as_deref(), te.as_deref());
        let second = classify_diff(sg.as_deref(), tg.as_deref(), se.as_deref(), te.as_deref());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_presence_asymmetry_dominates(
        present in hash_opt().prop_filter("needs a hash", Option::is_some),
        se in hash_opt(),
        te in hash_opt(),
    ) {
        prop_assert_eq!(
            classify_diff(None, present.as_deref(), se.as_deref(), te.as_deref()),
            DiffStatus::TargetOnly
        );
        prop_assert_eq!(
            classify_diff(present.as_deref(), None, se.as_deref(), te.as_deref()),
            DiffStatus::Added
        );
    }

    #[test]
    fn test_conflict_requires_both_preconditions(
        sg in hash_opt(),
        tg in hash_opt(),
        se in hash_opt(),
        te in hash_opt(),
    ) {
        let status = classify_diff(sg.as_deref(), tg.as_deref(), se.as_deref(), te.as_deref());
        if status == DiffStatus::Conflict {
            // Both Git states present and diverged, and the source runtime
            // drifted from its own Git state.
            prop_assert!(sg.is_some() && tg.is_some());
            prop_assert_ne!(&sg, &tg);
            prop_assert!(se.is_some());
            prop_assert_ne!(&se, &sg);
        }
    }

    #[test]
    fn test_conflict_wins_whenever_its_precondition_holds(
        sg in hash_opt(),
        tg in hash_opt(),
        se in hash_opt(),
        te in hash_opt(),
    ) {
        let both_present_and_diverged =
            sg.is_some() && tg.is_some() && sg != tg;
        let source_drifted = se.is_some() && se != sg;
        let status = classify_diff(sg.as_deref(), tg.as_deref(), se.as_deref(), te.as_deref());
        if both_present_and_diverged && source_drifted {
            prop_assert_eq!(status, DiffStatus::Conflict);
        } else {
            prop_assert_ne!(status, DiffStatus::Conflict);
        }
    }

    #[test]
    fn test_unchanged_means_nothing_to_promote(
        sg in hash_opt(),
        tg in hash_opt(),
        se in hash_opt(),
        te in hash_opt(),
    ) {
        let status = classify_diff(sg.as_deref(), tg.as_deref(), se.as_deref(), te.as_deref());
        if status == DiffStatus::Unchanged {
            prop_assert_eq!(&sg, &tg);
            // Any present source runtime copy matches the common Git state.
            if sg.is_some() && se.is_some() {
                prop_assert_eq!(&se, &sg);
            }
        }
    }

    #[test]
    fn test_hotfix_only_when_target_runtime_matches_source(
        sg in hash_opt(),
        tg in hash_opt(),
        se in hash_opt(),
        te in hash_opt(),
    ) {
        let status = classify_diff(sg.as_deref(), tg.as_deref(), se.as_deref(), te.as_deref());
        if status == DiffStatus::TargetHotfix {
            prop_assert_eq!(&te, &sg);
            prop_assert_ne!(&tg, &sg);
        }
    }
}
