//! Property-based tests for coverage analysis
//!
//! Uses proptest to generate recovered test suites and verify the
//! analyzer's invariants: exhaustive partitioning, bounded percentages,
//! and monotonicity under suite growth.

use proptest::prelude::*;
use specforge::{analyze, Assertion, AssertionKind, Category, TestScenario, TestSpec};

fn scenario(category: Category, name: &str, action: Option<&str>, assertions: usize) -> TestScenario {
    TestScenario {
        category,
        name: name.to_string(),
        description: String::new(),
        action: action.map(str::to_string),
        setup: Vec::new(),
        steps: Vec::new(),
        assertions: (0..assertions)
            .map(|i| Assertion {
                kind: AssertionKind::Existence,
                target: format!("column:field_{i}"),
                expected: None,
                message: String::new(),
            })
            .collect(),
    }
}

fn expected_suite() -> TestSpec {
    TestSpec {
        entity: "Contact".into(),
        schema: "crm".into(),
        scenarios: vec![
            scenario(Category::Structure, "table_structure", None, 4),
            scenario(Category::Crud, "create_succeeds", None, 2),
            scenario(Category::Crud, "update_succeeds", None, 2),
            scenario(Category::Action, "promote_happy_path", Some("promote"), 3),
            scenario(Category::Action, "archive_happy_path", Some("archive"), 3),
            scenario(Category::Integration, "lifecycle", None, 2),
        ],
    }
}

/// Any subset of the expected suite, each kept scenario possibly with
/// fewer assertions than expected
fn any_recovered() -> impl Strategy<Value = TestSpec> {
    let expected = expected_suite();
    let per_scenario = expected
        .scenarios
        .into_iter()
        .map(|s| {
            let max = s.assertions.len();
            (any::<bool>(), 0..=max).prop_map(move |(keep, kept_assertions)| {
                keep.then(|| {
                    let mut copy = s.clone();
                    copy.assertions.truncate(kept_assertions);
                    copy
                })
            })
        })
        .collect::<Vec<_>>();
    per_scenario.prop_map(|kept| TestSpec {
        entity: "Contact".into(),
        schema: "crm".into(),
        scenarios: kept.into_iter().flatten().collect(),
    })
}

proptest! {
    #[test]
    fn partition_is_exhaustive(recovered in any_recovered()) {
        let expected = expected_suite();
        let report = analyze(&recovered, &expected);
        prop_assert_eq!(
            report.covered.len() + report.partial.len() + report.missing.len(),
            expected.scenarios.len()
        );
    }

    #[test]
    fn percentages_are_bounded(recovered in any_recovered()) {
        let report = analyze(&recovered, &expected_suite());
        for cat in &report.categories {
            prop_assert!(cat.percent <= 100);
            prop_assert!(cat.covered <= cat.expected || cat.expected == 0);
        }
    }

    #[test]
    fn growing_the_suite_never_loses_coverage(recovered in any_recovered()) {
        let expected = expected_suite();
        let before = analyze(&recovered, &expected);

        // re-add every expected scenario on top of the recovered set
        let mut grown = recovered.clone();
        grown.scenarios.extend(expected.scenarios.clone());
        let after = analyze(&grown, &expected);

        prop_assert!(after.missing.len() <= before.missing.len());
        prop_assert!(
            after.covered.len() + after.partial.len()
                >= before.covered.len() + before.partial.len()
        );
    }

    #[test]
    fn full_suite_covers_everything(mut recovered in any_recovered()) {
        let expected = expected_suite();
        recovered.scenarios = expected.scenarios.clone();
        let report = analyze(&recovered, &expected);
        prop_assert!(report.missing.is_empty());
        prop_assert!(report.partial.is_empty());
        prop_assert_eq!(report.covered.len(), expected.scenarios.len());
    }
}

#[test]
fn empty_suite_misses_everything() {
    let expected = expected_suite();
    let empty = TestSpec {
        entity: "Contact".into(),
        schema: "crm".into(),
        scenarios: Vec::new(),
    };
    let report = analyze(&empty, &expected);
    assert_eq!(report.missing.len(), expected.scenarios.len());
    assert!(report.covered.is_empty());
}

#[test]
fn renamed_scenarios_still_count() {
    let expected = expected_suite();
    let mut recovered = expected.clone();
    for s in &mut recovered.scenarios {
        s.name = format!("custom_{}", s.name);
    }
    let report = analyze(&recovered, &expected);
    assert!(report.missing.is_empty());
}
