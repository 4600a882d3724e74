//! Best-effort pytest parser
//!
//! Recovers one scenario per `def test_*` method. Docstring markers from
//! the pytest renderer are preferred; without them the test name and the
//! statements in the body drive category and action inference.

use crate::extract::{infer_category, parse_category, Extraction, ExtractionWarning};
use crate::testspec::{Assertion, AssertionKind, Category, TestScenario, TestSpec, TestStep};
use crate::util::to_snake_case;
use regex::Regex;
use std::sync::LazyLock;

static CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"class\s+Test(\w+?)(?:Integration)?\s*:").expect("valid pattern"));
static TEST_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s+def\s+(test_\w+)\s*\(").expect("valid pattern"));
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Scenario:\s*(\S+)\s*\|\s*category:\s*(\w+)(?:\s*\|\s*action:\s*(\S+))?")
        .expect("valid pattern")
});
static SCHEMA_TB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\.tb_(\w+)").expect("valid pattern"));
static EXECUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"cur\.execute\("(.+)"\)"#).expect("valid pattern"));
static ASSERT_EQ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"assert\s+cur\.fetchone\(\)\[0\]\s*==\s*'([^']*)'").expect("valid pattern")
});
static ASSERT_NONNULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"assert\s+cur\.fetchone\(\)(?:\[0\])?\s+is\s+not\s+None").expect("valid pattern")
});
static ROUTINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)\.(\w+)\(").expect("valid pattern"));

pub fn extract(source: &str) -> Extraction {
    let mut warnings = Vec::new();

    let entity = CLASS
        .captures(source)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| {
            warnings.push(ExtractionWarning {
                line: 1,
                detail: "no Test* class found".to_string(),
            });
            "Unknown".to_string()
        });
    let schema = SCHEMA_TB
        .captures(source)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "public".to_string());
    let entity_snake = to_snake_case(&entity);

    let defs: Vec<(usize, String)> = TEST_DEF
        .captures_iter(source)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            Some((m.start(), caps[1].to_string()))
        })
        .collect();

    let mut scenarios = Vec::new();
    for (i, (start, def_name)) in defs.iter().enumerate() {
        let end = defs.get(i + 1).map(|(s, _)| *s).unwrap_or(source.len());
        let block = &source[*start..end];
        scenarios.push(parse_test(
            block,
            def_name,
            &entity_snake,
            line_of(source, *start),
            &mut warnings,
        ));
    }

    Extraction {
        spec: TestSpec {
            entity,
            schema,
            scenarios,
        },
        warnings,
    }
}

fn parse_test(
    block: &str,
    def_name: &str,
    entity_snake: &str,
    first_line: usize,
    warnings: &mut Vec<ExtractionWarning>,
) -> TestScenario {
    let bare = def_name.strip_prefix("test_").unwrap_or(def_name);

    let (name, category, mut action) = match MARKER.captures(block) {
        Some(caps) => (
            caps[1].to_string(),
            parse_category(&caps[2]).unwrap_or_else(|| infer_category(&caps[1])),
            caps.get(3).map(|m| m.as_str().to_string()),
        ),
        None => (bare.to_string(), infer_category(bare), None),
    };

    let mut scenario = TestScenario {
        category,
        name,
        description: String::new(),
        action: None,
        setup: Vec::new(),
        steps: Vec::new(),
        assertions: Vec::new(),
    };

    let mut raises_pending = false;
    for (offset, raw) in block.lines().enumerate() {
        let line = raw.trim();

        if line.contains("pytest.raises(") {
            raises_pending = true;
            continue;
        }
        if let Some(caps) = EXECUTE.captures(line) {
            let statement = caps[1].replace("\\\"", "\"");
            if raises_pending {
                raises_pending = false;
                scenario.steps.push(TestStep {
                    description: String::new(),
                    operation: statement,
                });
                scenario.assertions.push(Assertion {
                    kind: AssertionKind::ErrorThrown,
                    target: "step".to_string(),
                    expected: None,
                    message: String::new(),
                });
            } else if statement.starts_with("SELECT") {
                scenario.steps.push(TestStep {
                    description: String::new(),
                    operation: statement,
                });
            } else {
                scenario.setup.push(TestStep {
                    description: String::new(),
                    operation: statement,
                });
            }
            continue;
        }
        if let Some(caps) = ASSERT_EQ.captures(line) {
            let expected = caps[1].to_string();
            let kind = if expected.starts_with("failed:") {
                AssertionKind::ErrorThrown
            } else {
                AssertionKind::Equality
            };
            let target = if scenario
                .steps
                .last()
                .map(|s| s.operation.contains(".status"))
                .unwrap_or(false)
            {
                "status".to_string()
            } else {
                "value".to_string()
            };
            scenario.assertions.push(Assertion {
                kind,
                target,
                expected: Some(expected),
                message: String::new(),
            });
            continue;
        }
        if ASSERT_NONNULL.is_match(line) {
            scenario.assertions.push(Assertion {
                kind: AssertionKind::NonNull,
                target: "value".to_string(),
                expected: None,
                message: String::new(),
            });
            continue;
        }
        if line.starts_with("assert ") {
            // an assert shape the parser does not model
            let recognized = line.contains("fetchone()[0] > 0")
                || line.contains("fetchone() is not None")
                || line.contains("fetchone()[0] ==");
            if recognized {
                scenario.assertions.push(Assertion {
                    kind: AssertionKind::Existence,
                    target: "row".to_string(),
                    expected: None,
                    message: String::new(),
                });
            } else {
                warnings.push(ExtractionWarning {
                    line: first_line + offset,
                    detail: format!("unrecognized assertion: {}", line),
                });
            }
        }
    }

    if action.is_none() && scenario.category == Category::Action {
        action = recover_action_name(block, entity_snake);
    }
    scenario.action = action;
    scenario
}

fn recover_action_name(text: &str, entity_snake: &str) -> Option<String> {
    let prefix = format!("{}_", entity_snake);
    ROUTINE
        .captures_iter(text)
        .map(|caps| caps[2].to_string())
        .find_map(|name| name.strip_prefix(&prefix).map(|a| a.to_string()))
}

fn line_of(source: &str, byte: usize) -> usize {
    source[..byte].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Entity;
    use crate::testgen::{pytest, synthesize};
    use crate::validate::validate;

    fn generated() -> String {
        let ir = validate(&[Entity::from_yaml(
            r#"
entity: Contact
schema: crm
fields:
  email: text! unique
  status: enum(lead, customer) = lead
actions:
  - name: promote
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
"#,
        )
        .unwrap()])
        .unwrap();
        let specs = synthesize(&ir);
        pytest::render(&specs[0])["tests/pytest/test_contact.py"].clone()
    }

    #[test]
    fn generated_file_round_trips_scenario_structure() {
        let py = generated();
        let extraction = extract(&py);
        assert_eq!(extraction.spec.entity, "Contact");
        assert_eq!(extraction.spec.schema, "crm");

        let happy = extraction
            .spec
            .scenarios
            .iter()
            .find(|s| s.name == "promote_happy_path")
            .unwrap();
        assert_eq!(happy.category, Category::Action);
        assert_eq!(happy.action.as_deref(), Some("promote"));

        let failure = extraction
            .spec
            .scenarios
            .iter()
            .find(|s| s.name == "promote_rejects_when_not_a_lead")
            .unwrap();
        assert!(failure
            .assertions
            .iter()
            .any(|a| a.expected.as_deref() == Some("failed:not_a_lead")));
    }

    #[test]
    fn handwritten_test_without_markers() {
        let py = r#"
import pytest

class TestContactIntegration:
    def test_create_contact(self, clean_db):
        with clean_db.cursor() as cur:
            cur.execute("INSERT INTO crm.tb_contact (email) VALUES ('x')")
            cur.execute("SELECT count(*) FROM crm.tb_contact")
            assert cur.fetchone()[0] > 0
"#;
        let extraction = extract(py);
        assert_eq!(extraction.spec.entity, "Contact");
        let scenario = &extraction.spec.scenarios[0];
        assert_eq!(scenario.category, Category::Crud);
        assert_eq!(scenario.name, "create_contact");
    }

    #[test]
    fn unmodeled_asserts_become_warnings() {
        let py = r#"
class TestContactIntegration:
    def test_weird(self, clean_db):
        with clean_db.cursor() as cur:
            cur.execute("SELECT 1 FROM crm.tb_contact")
            assert some_custom_helper(cur)
"#;
        let extraction = extract(py);
        assert!(extraction
            .warnings
            .iter()
            .any(|w| w.detail.contains("some_custom_helper")));
    }
}
