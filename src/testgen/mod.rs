//! Test synthesis
//!
//! Derives a [`TestSpec`] per entity from the validated batch: structure
//! checks, CRUD paths, per-action happy and failure paths, and one
//! end-to-end integration chain. Scenario names and ordering are pure
//! functions of the entity, so synthesis is deterministic.
//!
//! Setup rows are derived from the action conditions themselves: a happy
//! path seeds values satisfying every validate condition, a failure path
//! seeds values violating the first one.

pub mod pgtap;
pub mod pytest;

use crate::compile::{compile_entity, CompiledAction, CompiledOp};
use crate::expr::{BinOp, Expr, Literal};
use crate::spec::{Entity, Field, FieldType};
use crate::testspec::{Assertion, AssertionKind, Category, TestScenario, TestSpec, TestStep};
use crate::util::{pk_column, routine_name, table_name};
use crate::validate::Ir;

/// Synthesize one [`TestSpec`] per entity, in batch order
pub fn synthesize(ir: &Ir) -> Vec<TestSpec> {
    ir.entities()
        .iter()
        .map(|entity| synthesize_entity(ir, entity))
        .collect()
}

/// Which categories to include
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryFilter {
    pub structure: bool,
    pub crud: bool,
    pub actions: bool,
    pub integration: bool,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        CategoryFilter {
            structure: true,
            crud: true,
            actions: true,
            integration: true,
        }
    }
}

pub fn synthesize_entity(ir: &Ir, entity: &Entity) -> TestSpec {
    synthesize_filtered(ir, entity, CategoryFilter::default())
}

pub fn synthesize_filtered(ir: &Ir, entity: &Entity, filter: CategoryFilter) -> TestSpec {
    let compiled = compile_entity(ir, entity).unwrap_or_default();
    let mut scenarios = Vec::new();

    if filter.structure {
        scenarios.push(structure_scenario(entity));
    }
    if filter.crud {
        scenarios.extend(crud_scenarios(entity));
    }
    if filter.actions {
        for action in &compiled {
            scenarios.push(action_happy_path(entity, action));
            if let Some(failure) = action_failure_path(entity, action) {
                scenarios.push(failure);
            }
        }
    }
    if filter.integration {
        scenarios.push(integration_scenario(entity, &compiled));
    }

    TestSpec {
        entity: entity.name.clone(),
        schema: entity.schema.clone(),
        scenarios,
    }
}

// ============================================================================
// Structure
// ============================================================================

fn structure_scenario(entity: &Entity) -> TestScenario {
    let table = table_name(&entity.name);
    let mut assertions = vec![Assertion {
        kind: AssertionKind::Existence,
        target: format!("table:{}", table),
        expected: None,
        message: format!("{} exists", table),
    }];

    assertions.push(Assertion {
        kind: AssertionKind::Existence,
        target: format!("pk:{}", pk_column(&entity.name)),
        expected: None,
        message: "surrogate primary key".into(),
    });

    for field in &entity.fields {
        let column = crate::render::sql::column_name(entity, &field.name);
        assertions.push(Assertion {
            kind: AssertionKind::Existence,
            target: format!("column:{}", column),
            expected: None,
            message: format!("column {}", column),
        });
        if field.unique {
            assertions.push(Assertion {
                kind: AssertionKind::Existence,
                target: format!("unique:{}", column),
                expected: None,
                message: format!("{} is unique", column),
            });
        }
    }

    for audit in audit_columns(entity) {
        assertions.push(Assertion {
            kind: AssertionKind::Existence,
            target: format!("column:{}", audit),
            expected: None,
            message: format!("audit column {}", audit),
        });
    }

    TestScenario {
        category: Category::Structure,
        name: "table_structure".into(),
        description: format!("schema shape of {}.{}", entity.schema, table),
        action: None,
        setup: Vec::new(),
        steps: Vec::new(),
        assertions,
    }
}

fn audit_columns(entity: &Entity) -> Vec<&'static str> {
    let mut cols = vec!["created_at", "updated_at"];
    if entity.soft_delete {
        cols.push("deleted_at");
    }
    cols
}

// ============================================================================
// CRUD
// ============================================================================

fn crud_scenarios(entity: &Entity) -> Vec<TestScenario> {
    let mut scenarios = vec![create_scenario(entity)];

    for field in entity.fields.iter().filter(|f| f.unique) {
        scenarios.push(duplicate_scenario(entity, field));
    }
    if let Some(update) = update_scenario(entity) {
        scenarios.push(update);
    }
    scenarios.push(delete_scenario(entity));
    scenarios
}

fn create_scenario(entity: &Entity) -> TestScenario {
    TestScenario {
        category: Category::Crud,
        name: "create_succeeds".into(),
        description: format!("a valid {} can be inserted", entity.name),
        action: None,
        setup: Vec::new(),
        steps: vec![TestStep {
            description: "insert a valid row".into(),
            operation: insert_statement(entity, &sample_row(entity, 1)),
        }],
        assertions: vec![
            Assertion {
                kind: AssertionKind::Existence,
                target: format!("row:{}", table_name(&entity.name)),
                expected: None,
                message: "row is present".into(),
            },
            Assertion {
                kind: AssertionKind::NonNull,
                target: "column:id".into(),
                expected: None,
                message: "public id is assigned".into(),
            },
        ],
    }
}

fn duplicate_scenario(entity: &Entity, field: &Field) -> TestScenario {
    let row = sample_row(entity, 1);
    TestScenario {
        category: Category::Crud,
        name: format!("create_duplicate_{}_fails", field.name),
        description: format!("a second row with the same {} is rejected", field.name),
        action: None,
        setup: vec![TestStep {
            description: "seed the first row".into(),
            operation: insert_statement(entity, &row),
        }],
        steps: vec![TestStep {
            description: "insert a conflicting row".into(),
            operation: insert_statement(entity, &row),
        }],
        assertions: vec![Assertion {
            kind: AssertionKind::ErrorThrown,
            target: format!("column:{}", field.name),
            expected: None,
            message: format!("duplicate {} rejected", field.name),
        }],
    }
}

fn update_scenario(entity: &Entity) -> Option<TestScenario> {
    // first scalar field that can hold a second distinct sample value
    let field = entity.fields.iter().find(|f| updatable(f))?;
    let new_value = sample_value(field, 2);
    let table = table_name(&entity.name);
    Some(TestScenario {
        category: Category::Crud,
        name: "update_succeeds".into(),
        description: format!("{} of {} can be changed", field.name, entity.name),
        action: None,
        setup: vec![TestStep {
            description: "seed a row".into(),
            operation: insert_statement(entity, &sample_row(entity, 1)),
        }],
        steps: vec![TestStep {
            description: format!("change {}", field.name),
            operation: format!(
                "UPDATE {}.{} SET {} = {}",
                entity.schema, table, field.name, new_value
            ),
        }],
        assertions: vec![Assertion {
            kind: AssertionKind::Equality,
            target: format!("column:{}", field.name),
            expected: Some(strip_quotes(&new_value)),
            message: format!("{} was updated", field.name),
        }],
    })
}

fn updatable(field: &Field) -> bool {
    matches!(
        field.ty,
        FieldType::Text | FieldType::Integer | FieldType::Decimal | FieldType::Boolean
    ) || matches!(&field.ty, FieldType::Enum(values) if values.len() > 1)
}

fn delete_scenario(entity: &Entity) -> TestScenario {
    let table = table_name(&entity.name);
    if entity.soft_delete {
        TestScenario {
            category: Category::Crud,
            name: "soft_delete_succeeds".into(),
            description: format!("{} rows are soft-deleted", entity.name),
            action: None,
            setup: vec![TestStep {
                description: "seed a row".into(),
                operation: insert_statement(entity, &sample_row(entity, 1)),
            }],
            steps: vec![TestStep {
                description: "mark the row deleted".into(),
                operation: format!(
                    "UPDATE {}.{} SET deleted_at = now()",
                    entity.schema, table
                ),
            }],
            assertions: vec![Assertion {
                kind: AssertionKind::NonNull,
                target: "column:deleted_at".into(),
                expected: None,
                message: "deleted_at is set".into(),
            }],
        }
    } else {
        TestScenario {
            category: Category::Crud,
            name: "delete_succeeds".into(),
            description: format!("{} rows can be removed", entity.name),
            action: None,
            setup: vec![TestStep {
                description: "seed a row".into(),
                operation: insert_statement(entity, &sample_row(entity, 1)),
            }],
            steps: vec![TestStep {
                description: "remove the row".into(),
                operation: format!("DELETE FROM {}.{}", entity.schema, table),
            }],
            assertions: vec![Assertion {
                kind: AssertionKind::Equality,
                target: format!("count:{}", table),
                expected: Some("0".into()),
                message: "no rows remain".into(),
            }],
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

fn action_happy_path(entity: &Entity, action: &CompiledAction) -> TestScenario {
    let mut row = sample_row(entity, 1);
    for op in &action.ops {
        if let CompiledOp::CheckAuth { condition } | CompiledOp::Validate { condition, .. } = op {
            apply_satisfying(entity, &mut row, condition);
        }
    }

    let mut assertions = vec![Assertion {
        kind: AssertionKind::Equality,
        target: "status".into(),
        expected: Some("success".into()),
        message: format!("{} succeeds on a satisfying row", action.name),
    }];
    for op in &action.ops {
        if let CompiledOp::Update {
            entity: target,
            assignments,
            ..
        } = op
        {
            if target == &entity.name {
                for a in assignments {
                    if literal_value(&a.value).is_some() {
                        assertions.push(Assertion {
                            kind: AssertionKind::Equality,
                            target: format!("column:{}", a.field),
                            expected: literal_value(&a.value),
                            message: format!("{} was set by {}", a.field, action.name),
                        });
                    }
                }
            }
        }
    }

    TestScenario {
        category: Category::Action,
        name: format!("{}_happy_path", action.name),
        description: format!("{} completes on a row meeting every condition", action.name),
        action: Some(action.name.clone()),
        setup: vec![TestStep {
            description: "seed a satisfying row".into(),
            operation: insert_statement(entity, &row),
        }],
        steps: vec![TestStep {
            description: format!("run {}", action.name),
            operation: action_call(entity, action),
        }],
        assertions,
    }
}

fn action_failure_path(entity: &Entity, action: &CompiledAction) -> Option<TestScenario> {
    let (condition, tag) = action.ops.iter().find_map(|op| match op {
        CompiledOp::Validate { condition, tag } => Some((condition, tag.clone())),
        _ => None,
    })?;

    let mut row = sample_row(entity, 1);
    apply_violating(entity, &mut row, condition)?;

    Some(TestScenario {
        category: Category::Action,
        name: format!("{}_rejects_when_{}", action.name, tag),
        description: format!("{} fails with {} on a violating row", action.name, tag),
        action: Some(action.name.clone()),
        setup: vec![TestStep {
            description: "seed a violating row".into(),
            operation: insert_statement(entity, &row),
        }],
        steps: vec![TestStep {
            description: format!("run {}", action.name),
            operation: action_call(entity, action),
        }],
        assertions: vec![Assertion {
            kind: AssertionKind::ErrorThrown,
            target: "status".into(),
            expected: Some(format!("failed:{}", tag)),
            message: format!("{} rejected with {}", action.name, tag),
        }],
    })
}

fn integration_scenario(entity: &Entity, actions: &[CompiledAction]) -> TestScenario {
    let mut row = sample_row(entity, 1);
    for action in actions {
        for op in &action.ops {
            if let CompiledOp::CheckAuth { condition } | CompiledOp::Validate { condition, .. } =
                op
            {
                apply_satisfying(entity, &mut row, condition);
            }
        }
    }

    let steps = actions
        .iter()
        .map(|action| TestStep {
            description: format!("run {}", action.name),
            operation: action_call(entity, action),
        })
        .collect();

    TestScenario {
        category: Category::Integration,
        name: "lifecycle".into(),
        description: format!("create a {} and run every action in order", entity.name),
        action: None,
        setup: vec![TestStep {
            description: "seed a row".into(),
            operation: insert_statement(entity, &row),
        }],
        steps,
        assertions: vec![
            Assertion {
                kind: AssertionKind::Existence,
                target: format!("row:{}", table_name(&entity.name)),
                expected: None,
                message: "row survives the action chain".into(),
            },
            Assertion {
                kind: AssertionKind::NonNull,
                target: "column:id".into(),
                expected: None,
                message: "public id is stable".into(),
            },
        ],
    }
}

// ============================================================================
// Value derivation
// ============================================================================

/// Deterministic sample values for required fields; reference fields are
/// left out, the database fills audit columns
fn sample_row(entity: &Entity, seed: u32) -> Vec<(String, String)> {
    entity
        .fields
        .iter()
        .filter(|f| !matches!(f.ty, FieldType::Ref(_)))
        .filter(|f| !f.nullable || f.default.is_some() || f.unique)
        .map(|f| (f.name.clone(), sample_value(f, seed)))
        .collect()
}

fn sample_value(field: &Field, seed: u32) -> String {
    match &field.ty {
        FieldType::Text => format!("'{}_{}'", field.name, seed),
        FieldType::Integer => format!("{}", seed),
        FieldType::Decimal => format!("{}.5", seed),
        FieldType::Boolean => if seed % 2 == 1 { "true" } else { "false" }.into(),
        FieldType::Timestamp => "'2000-01-01T00:00:00Z'".into(),
        FieldType::Date => "'2000-01-01'".into(),
        FieldType::Json => "'{}'".into(),
        FieldType::Enum(values) => {
            let index = (seed as usize - 1).min(values.len() - 1);
            format!("'{}'", values[index])
        }
        FieldType::Ref(_) => "NULL".into(),
    }
}

/// Overwrite row values so `condition` holds
fn apply_satisfying(entity: &Entity, row: &mut Vec<(String, String)>, condition: &Expr) {
    match condition {
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
        } => {
            apply_satisfying(entity, row, lhs);
            apply_satisfying(entity, row, rhs);
        }
        Expr::Binary { op: BinOp::Or, lhs, .. } => apply_satisfying(entity, row, lhs),
        Expr::Binary { op, lhs, rhs } => {
            if let (Expr::Field(field), Expr::Literal(lit)) = (lhs.as_ref(), rhs.as_ref()) {
                if let Some(value) = satisfying_literal(entity, field, *op, lit) {
                    set_row(row, field, value);
                }
            }
        }
        _ => {}
    }
}

/// Overwrite row values so `condition` fails; `None` when no comparison
/// can be inverted
fn apply_violating(
    entity: &Entity,
    row: &mut Vec<(String, String)>,
    condition: &Expr,
) -> Option<()> {
    match condition {
        // violating either side violates the conjunction
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
        } => apply_violating(entity, row, lhs).or_else(|| apply_violating(entity, row, rhs)),
        Expr::Binary {
            op: BinOp::Or,
            lhs,
            rhs,
        } => {
            apply_violating(entity, row, lhs)?;
            apply_violating(entity, row, rhs)
        }
        Expr::Binary { op, lhs, rhs } => {
            if let (Expr::Field(field), Expr::Literal(lit)) = (lhs.as_ref(), rhs.as_ref()) {
                let value = violating_literal(entity, field, *op, lit)?;
                set_row(row, field, value);
                return Some(());
            }
            None
        }
        Expr::Not(inner) => {
            // failing `not c` means satisfying c
            apply_satisfying(entity, row, inner);
            Some(())
        }
        _ => None,
    }
}

fn satisfying_literal(entity: &Entity, field: &str, op: BinOp, lit: &Literal) -> Option<String> {
    match (op, lit) {
        (BinOp::Eq, _) => Some(render_literal(lit)),
        (BinOp::Ne, Literal::Str(s)) => other_string(entity, field, s),
        (BinOp::Ne, Literal::Num(n)) => Some(format!("{}", *n as i64 + 1)),
        (BinOp::Gt | BinOp::Ge, Literal::Num(n)) => Some(format!("{}", *n as i64 + 1)),
        (BinOp::Lt | BinOp::Le, Literal::Num(n)) => Some(format!("{}", *n as i64 - 1)),
        _ => None,
    }
}

fn violating_literal(entity: &Entity, field: &str, op: BinOp, lit: &Literal) -> Option<String> {
    match (op, lit) {
        (BinOp::Eq, Literal::Str(s)) => other_string(entity, field, s),
        (BinOp::Eq, Literal::Num(n)) => Some(format!("{}", *n as i64 + 1)),
        (BinOp::Eq, Literal::Bool(b)) => Some((!b).to_string()),
        (BinOp::Ne, _) => Some(render_literal(lit)),
        (BinOp::Gt | BinOp::Ge, Literal::Num(n)) => Some(format!("{}", *n as i64 - 1)),
        (BinOp::Lt | BinOp::Le, Literal::Num(n)) => Some(format!("{}", *n as i64 + 1)),
        _ => None,
    }
}

/// A string value distinct from `other`. Enum fields must stay inside
/// their declared values or the seed insert itself would be rejected;
/// a single-value enum has no distinct member, so derivation gives up.
fn other_string(entity: &Entity, field: &str, other: &str) -> Option<String> {
    if let Some(FieldType::Enum(values)) = entity.field(field).map(|f| &f.ty) {
        return values
            .iter()
            .find(|v| v.as_str() != other)
            .map(|v| format!("'{}'", v));
    }
    Some(format!("'not_{}'", other))
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Str(s) => format!("'{}'", s),
        Literal::Num(n) => {
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "NULL".into(),
    }
}

fn set_row(row: &mut Vec<(String, String)>, field: &str, value: String) {
    if let Some(slot) = row.iter_mut().find(|(name, _)| name == field) {
        slot.1 = value;
    } else {
        row.push((field.to_string(), value));
    }
}

fn literal_value(value: &str) -> Option<String> {
    match Expr::parse(value) {
        Ok(Expr::Literal(lit)) => Some(strip_quotes(&render_literal(&lit))),
        _ => None,
    }
}

fn strip_quotes(value: &str) -> String {
    value.trim_matches('\'').to_string()
}

fn insert_statement(entity: &Entity, row: &[(String, String)]) -> String {
    let columns: Vec<String> = row
        .iter()
        .map(|(name, _)| crate::render::sql::column_name(entity, name))
        .collect();
    let values: Vec<&str> = row.iter().map(|(_, v)| v.as_str()).collect();
    format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        entity.schema,
        table_name(&entity.name),
        columns.join(", "),
        values.join(", ")
    )
}

fn action_call(entity: &Entity, action: &CompiledAction) -> String {
    format!(
        "SELECT {}.{}(:id)",
        entity.schema,
        routine_name(&entity.name, &action.name)
    )
}
