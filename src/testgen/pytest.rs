//! pytest rendering of a [`TestSpec`]
//!
//! One database-backed integration test module per entity in the
//! `class Test{Entity}Integration` / `clean_db` fixture shape. Each test
//! method's docstring carries the same scenario marker the pgTAP renderer
//! emits, so both dialects extract back to the same structure.

use crate::render::FileMap;
use crate::testspec::{Assertion, AssertionKind, TestScenario, TestSpec};
use crate::util::{pk_column, table_name, to_pascal_case, to_snake_case};

pub fn render(spec: &TestSpec) -> FileMap {
    let table = table_name(&spec.entity);
    let class = to_pascal_case(&spec.entity);
    let mut out = String::new();

    out.push_str(&format!(
        "\"\"\"Integration tests for {}.{}\"\"\"\n",
        spec.schema, spec.entity
    ));
    out.push_str("import pytest\nimport psycopg\n\n\n");
    out.push_str(&format!("class Test{}Integration:\n", class));
    out.push_str(&format!(
        "    \"\"\"Database-backed tests for {}.\"\"\"\n\n",
        spec.entity
    ));
    out.push_str("    @pytest.fixture\n");
    out.push_str("    def clean_db(self, test_db_connection):\n");
    out.push_str("        \"\"\"Start each test from an empty table.\"\"\"\n");
    out.push_str("        with test_db_connection.cursor() as cur:\n");
    out.push_str(&format!(
        "            cur.execute(\"DELETE FROM {}.{}\")\n",
        spec.schema, table
    ));
    out.push_str("        test_db_connection.commit()\n");
    out.push_str("        return test_db_connection\n");

    for scenario in &spec.scenarios {
        out.push('\n');
        render_scenario(spec, scenario, &mut out);
    }

    let mut files = FileMap::new();
    files.insert(
        format!("tests/pytest/test_{}.py", to_snake_case(&spec.entity)),
        out,
    );
    files
}

fn render_scenario(spec: &TestSpec, scenario: &TestScenario, out: &mut String) {
    out.push_str(&format!("    def test_{}(self, clean_db):\n", scenario.name));

    let mut marker = format!(
        "Scenario: {} | category: {}",
        scenario.name, scenario.category
    );
    if let Some(action) = &scenario.action {
        marker.push_str(&format!(" | action: {}", action));
    }
    out.push_str(&format!("        \"\"\"{}\"\"\"\n", marker));
    out.push_str("        with clean_db.cursor() as cur:\n");

    let mut emitted = false;
    for step in &scenario.setup {
        push_execute(out, &resolve_placeholders(spec, &step.operation));
        emitted = true;
    }

    let throws = scenario
        .assertions
        .iter()
        .any(|a| a.kind == AssertionKind::ErrorThrown && a.expected.is_none());
    let status_asserted = scenario.assertions.iter().any(|a| a.target == "status");

    for (i, step) in scenario.steps.iter().enumerate() {
        let last = i + 1 == scenario.steps.len();
        // consumed by the failure or status assertion below
        if last && (throws || status_asserted) {
            continue;
        }
        push_execute(out, &resolve_placeholders(spec, &step.operation));
        emitted = true;
    }

    for assertion in &scenario.assertions {
        render_assertion(spec, scenario, assertion, out);
        emitted = true;
    }

    if !emitted {
        out.push_str("            pass\n");
    }
}

fn render_assertion(
    spec: &TestSpec,
    scenario: &TestScenario,
    assertion: &Assertion,
    out: &mut String,
) {
    let schema = &spec.schema;
    let table = table_name(&spec.entity);

    if let Some(target) = assertion.target.strip_prefix("table:") {
        push_query(out, &format!("SELECT to_regclass('{}.{}')", schema, target));
        out.push_str(&format!(
            "            assert cur.fetchone()[0] is not None, \"{}\"\n",
            assertion.message
        ));
        return;
    }
    if assertion.target.starts_with("pk:")
        || assertion.target.starts_with("unique:")
        || (assertion.target.starts_with("column:") && assertion.kind == AssertionKind::Existence)
    {
        let column = assertion
            .target
            .split(':')
            .nth(1)
            .unwrap_or(&assertion.target);
        push_query(
            out,
            &format!(
                "SELECT column_name FROM information_schema.columns WHERE table_schema = '{}' AND table_name = '{}' AND column_name = '{}'",
                schema, table, column
            ),
        );
        out.push_str(&format!(
            "            assert cur.fetchone() is not None, \"{}\"\n",
            assertion.message
        ));
        return;
    }
    if let Some(target) = assertion.target.strip_prefix("row:") {
        push_query(out, &format!("SELECT count(*) FROM {}.{}", schema, target));
        out.push_str(&format!(
            "            assert cur.fetchone()[0] > 0, \"{}\"\n",
            assertion.message
        ));
        return;
    }
    if let Some(target) = assertion.target.strip_prefix("count:") {
        push_query(out, &format!("SELECT count(*) FROM {}.{}", schema, target));
        out.push_str(&format!(
            "            assert cur.fetchone()[0] == {}, \"{}\"\n",
            assertion.expected.as_deref().unwrap_or("0"),
            assertion.message
        ));
        return;
    }
    if assertion.target == "status" {
        let call = scenario
            .steps
            .last()
            .map(|s| resolve_placeholders(spec, &s.operation))
            .unwrap_or_default();
        let expression = call.strip_prefix("SELECT ").unwrap_or(&call);
        push_query(out, &format!("SELECT ({}).status", expression));
        out.push_str(&format!(
            "            assert cur.fetchone()[0] == '{}', \"{}\"\n",
            assertion.expected.as_deref().unwrap_or("success"),
            assertion.message
        ));
        return;
    }
    if let Some(column) = assertion.target.strip_prefix("column:") {
        match assertion.kind {
            AssertionKind::ErrorThrown => {
                let op = scenario
                    .steps
                    .last()
                    .map(|s| resolve_placeholders(spec, &s.operation))
                    .unwrap_or_default();
                out.push_str(
                    "            with pytest.raises(psycopg.errors.UniqueViolation):\n",
                );
                out.push_str(&format!("                cur.execute(\"{}\")\n", escape(&op)));
            }
            AssertionKind::NonNull => {
                push_query(out, &last_row_query(spec, column));
                out.push_str(&format!(
                    "            assert cur.fetchone()[0] is not None, \"{}\"\n",
                    assertion.message
                ));
            }
            _ => {
                // cast the column, not the LIMIT argument
                push_query(out, &last_row_query(spec, &format!("{}::text", column)));
                out.push_str(&format!(
                    "            assert cur.fetchone()[0] == '{}', \"{}\"\n",
                    assertion.expected.as_deref().unwrap_or(""),
                    assertion.message
                ));
            }
        }
        return;
    }

    out.push_str(&format!("            # unchecked: {}\n", assertion.message));
}

fn push_execute(out: &mut String, operation: &str) {
    out.push_str(&format!("            cur.execute(\"{}\")\n", escape(operation)));
}

fn push_query(out: &mut String, query: &str) {
    out.push_str(&format!("            cur.execute(\"{}\")\n", escape(query)));
}

fn last_row_query(spec: &TestSpec, column: &str) -> String {
    format!(
        "SELECT {} FROM {}.{} ORDER BY {} DESC LIMIT 1",
        column,
        spec.schema,
        table_name(&spec.entity),
        pk_column(&spec.entity)
    )
}

fn resolve_placeholders(spec: &TestSpec, operation: &str) -> String {
    operation.replace(
        ":id",
        &format!(
            "(SELECT id FROM {}.{} ORDER BY {} DESC LIMIT 1)",
            spec.schema,
            table_name(&spec.entity),
            pk_column(&spec.entity)
        ),
    )
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Entity;
    use crate::testgen::synthesize;
    use crate::validate::validate;

    fn rendered() -> String {
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
        render(&specs[0])["tests/pytest/test_contact.py"].clone()
    }

    #[test]
    fn module_shape() {
        let py = rendered();
        assert!(py.contains("import pytest"));
        assert!(py.contains("import psycopg"));
        assert!(py.contains("class TestContactIntegration:"));
        assert!(py.contains("def clean_db(self, test_db_connection):"));
        assert!(py.contains("DELETE FROM crm.tb_contact"));
    }

    #[test]
    fn scenario_markers_in_docstrings() {
        let py = rendered();
        assert!(py.contains(
            "\"\"\"Scenario: promote_happy_path | category: action | action: promote\"\"\""
        ));
        assert!(py.contains("\"\"\"Scenario: table_structure | category: structure\"\"\""));
    }

    #[test]
    fn duplicate_insert_expects_unique_violation() {
        let py = rendered();
        assert!(py.contains("def test_create_duplicate_email_fails(self, clean_db):"));
        assert!(py.contains("with pytest.raises(psycopg.errors.UniqueViolation):"));
    }

    #[test]
    fn equality_assertion_casts_the_column_not_the_limit() {
        let py = rendered();
        assert!(py.contains(
            "SELECT status::text FROM crm.tb_contact ORDER BY pk_contact DESC LIMIT 1"
        ));
        assert!(!py.contains("LIMIT 1::text"));
    }

    #[test]
    fn action_status_is_asserted() {
        let py = rendered();
        assert!(py.contains("(crm.contact_promote("));
        assert!(py.contains("assert cur.fetchone()[0] == 'failed:not_a_lead'"));
        assert!(py.contains("assert cur.fetchone()[0] == 'success'"));
    }
}
