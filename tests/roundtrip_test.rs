//! Round-trip tests: synthesize → render → extract → coverage
//!
//! The extractors are best-effort, so the guarantee is weak soundness:
//! every scenario the renderers write back out must be recoverable by
//! category and action, and coverage against the synthesized expectation
//! must report nothing missing.

use specforge::testgen::{pgtap, pytest};
use specforge::{
    analyze_coverage, detect_dialect, extract_tests, synthesize_specs, Category, Dialect,
};

const COMPANY: &str = r#"
entity: Company
schema: crm
fields:
  name: text! unique
"#;

const CONTACT: &str = r#"
entity: Contact
schema: crm
fields:
  email: text! unique
  status: enum(lead, customer) = lead
  company: ref(Company)
actions:
  - name: promote
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
"#;

fn contact_spec() -> specforge::TestSpec {
    let specs = synthesize_specs(&[COMPANY, CONTACT]).unwrap();
    specs
        .into_iter()
        .find(|s| s.entity == "Contact")
        .unwrap()
}

#[test]
fn synthesized_scenarios_span_all_categories() {
    let spec = contact_spec();
    for category in Category::ALL {
        assert!(
            spec.scenarios_in(category).count() > 0,
            "no {category} scenarios"
        );
    }
    assert!(spec
        .scenarios
        .iter()
        .any(|s| s.name == "promote_happy_path"));
    assert!(spec
        .scenarios
        .iter()
        .any(|s| s.name == "promote_rejects_when_not_a_lead"));
}

#[test]
fn pgtap_round_trip_recovers_every_scenario() {
    let spec = contact_spec();
    let rendered = pgtap::render(&spec);
    let source = &rendered["tests/pgtap/test_contact.sql"];

    assert_eq!(detect_dialect(source), Some(Dialect::PgTap));
    let extraction = extract_tests(source, None);
    assert_eq!(extraction.spec.entity, "Contact");
    assert_eq!(extraction.spec.schema, "crm");

    for expected in &spec.scenarios {
        let recovered = extraction
            .spec
            .scenarios
            .iter()
            .find(|r| r.name == expected.name);
        let recovered = recovered.unwrap_or_else(|| panic!("lost scenario {}", expected.name));
        assert_eq!(recovered.category, expected.category);
        assert_eq!(recovered.action, expected.action);
    }

    let report = analyze_coverage(&extraction.spec, &spec);
    assert!(report.missing.is_empty(), "missing: {:?}", report.missing);
}

#[test]
fn pytest_round_trip_recovers_every_scenario() {
    let spec = contact_spec();
    let rendered = pytest::render(&spec);
    let source = &rendered["tests/pytest/test_contact.py"];

    assert_eq!(detect_dialect(source), Some(Dialect::Pytest));
    let extraction = extract_tests(source, None);
    assert_eq!(extraction.spec.entity, "Contact");

    for expected in &spec.scenarios {
        assert!(
            extraction
                .spec
                .scenarios
                .iter()
                .any(|r| r.name == expected.name && r.category == expected.category),
            "lost scenario {}",
            expected.name
        );
    }

    let report = analyze_coverage(&extraction.spec, &spec);
    assert!(report.missing.is_empty(), "missing: {:?}", report.missing);
}

#[test]
fn handwritten_pgtap_without_markers_is_recovered_with_warnings() {
    let source = r#"
BEGIN;
SELECT plan(3);
SELECT has_table('crm'::name, 'tb_contact'::name, 'contact table exists');
SELECT col_is_unique('crm', 'tb_contact', 'email', 'email is unique');
SELECT is((SELECT crm.contact_promote(
    (SELECT id FROM crm.tb_contact LIMIT 1))).status, 'success', 'promote works');
SELECT finish();
ROLLBACK;
"#;
    let extraction = extract_tests(source, Some(Dialect::PgTap));
    assert_eq!(extraction.spec.entity, "Contact");
    assert!(!extraction.spec.scenarios.is_empty());
    assert!(extraction
        .spec
        .scenarios
        .iter()
        .any(|s| s.category == Category::Structure));
    assert!(extraction
        .spec
        .scenarios
        .iter()
        .any(|s| s.action.as_deref() == Some("promote")));
}

#[test]
fn unknown_constructs_warn_but_never_fail() {
    let source = r#"
BEGIN;
SELECT plan(2);
SELECT has_table('crm'::name, 'tb_contact'::name, 'table exists');
SELECT results_eq('SELECT 1', 'SELECT 1', 'exotic assertion');
SELECT finish();
ROLLBACK;
"#;
    let extraction = extract_tests(source, Some(Dialect::PgTap));
    assert!(!extraction.warnings.is_empty());
    assert!(!extraction.spec.scenarios.is_empty());
}

#[test]
fn garbage_input_yields_empty_spec_not_an_error() {
    let extraction = extract_tests("lorem ipsum dolor sit amet", None);
    assert!(extraction.spec.scenarios.is_empty());
    assert_eq!(extraction.warnings.len(), 1);
}

#[test]
fn coverage_flags_a_pruned_suite_as_partial() {
    let expected = contact_spec();
    let mut pruned = expected.clone();
    pruned
        .scenarios
        .retain(|s| s.category != Category::Action);

    let report = analyze_coverage(&pruned, &expected);
    assert!(report
        .missing
        .iter()
        .any(|name| name.starts_with("promote_")));
    let action_coverage = report
        .categories
        .iter()
        .find(|c| c.category == Category::Action)
        .unwrap();
    assert!(action_coverage.percent < 100);
}
