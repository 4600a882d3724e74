//! Structural validation
//!
//! Turns a batch of parsed entities into a validated [`Ir`], or reports
//! every structural problem found. Validation never stops at the first
//! error: one pass over the batch collects all of them so a caller can
//! fix a whole document in one round.

use crate::expr::Expr;
use crate::spec::{Assignment, Entity, FieldType, Step};
use schemars::JsonSchema;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Validated batch of entities. Construction via [`validate`] is the only
/// way to obtain one, so downstream stages can rely on references
/// resolving and expressions parsing.
#[derive(Debug, Clone)]
pub struct Ir {
    entities: Vec<Entity>,
}

impl Ir {
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Look up an entity by schema-qualified name
    pub fn entity(&self, schema: &str, name: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.schema == schema && e.name == name)
    }

    /// Resolve an entity by bare name from the viewpoint of `owner`:
    /// same schema first, then any schema if the name is unambiguous
    pub fn resolve<'a>(&'a self, owner: &Entity, name: &str) -> Option<&'a Entity> {
        if let Some(e) = self.entity(&owner.schema, name) {
            return Some(e);
        }
        let mut matches = self.entities.iter().filter(|e| e.name == name);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }
}

/// One structural problem in a batch
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct StructuralError {
    pub kind: StructuralErrorKind,
    /// Schema of the entity the problem belongs to
    pub schema: String,
    /// Entity the problem belongs to
    pub entity: String,
    pub field: Option<String>,
    pub action: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub enum StructuralErrorKind {
    DuplicateEntity,
    DuplicateField,
    DuplicateAction,
    UnknownReference,
    UnknownField,
    InvalidExpression,
    InvalidDefault,
    InvalidFieldType,
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.entity)?;
        if let Some(field) = &self.field {
            write!(f, ".{}", field)?;
        }
        if let Some(action) = &self.action {
            write!(f, " (action {})", action)?;
        }
        write!(f, ": {}", self.detail)
    }
}

impl std::error::Error for StructuralError {}

impl StructuralError {
    fn new(kind: StructuralErrorKind, entity: &Entity, detail: String) -> Self {
        StructuralError {
            kind,
            schema: entity.schema.clone(),
            entity: entity.name.clone(),
            field: None,
            action: None,
            detail,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }
}

/// Validate a batch of entities. Returns the validated [`Ir`] on success,
/// or every structural error found — the check order is deterministic, so
/// the error list is stable for a given input.
pub fn validate(entities: &[Entity]) -> Result<Ir, Vec<StructuralError>> {
    let mut errors = Vec::new();

    check_duplicate_entities(entities, &mut errors);
    for entity in entities {
        check_duplicate_fields(entity, &mut errors);
        check_field_types(entity, &mut errors);
        check_references(entities, entity, &mut errors);
        check_indexes(entity, &mut errors);
        check_actions(entities, entity, &mut errors);
    }

    if errors.is_empty() {
        Ok(Ir {
            entities: entities.to_vec(),
        })
    } else {
        Err(errors)
    }
}

fn check_duplicate_entities(entities: &[Entity], errors: &mut Vec<StructuralError>) {
    let mut seen = BTreeSet::new();
    for e in entities {
        if !seen.insert((e.schema.as_str(), e.name.as_str())) {
            errors.push(StructuralError::new(
                StructuralErrorKind::DuplicateEntity,
                e,
                format!("entity '{}.{}' declared more than once", e.schema, e.name),
            ));
        }
    }
}

fn check_duplicate_fields(entity: &Entity, errors: &mut Vec<StructuralError>) {
    let mut seen = BTreeSet::new();
    for f in &entity.fields {
        if !seen.insert(f.name.as_str()) {
            errors.push(
                StructuralError::new(
                    StructuralErrorKind::DuplicateField,
                    entity,
                    format!("field '{}' declared more than once", f.name),
                )
                .with_field(&f.name),
            );
        }
    }
}

fn check_references(entities: &[Entity], entity: &Entity, errors: &mut Vec<StructuralError>) {
    for f in &entity.fields {
        if let FieldType::Ref(target) = &f.ty {
            let schema = target.schema_or(&entity.schema);
            let found = entities
                .iter()
                .any(|e| e.schema == schema && e.name == target.entity);
            if !found {
                errors.push(
                    StructuralError::new(
                        StructuralErrorKind::UnknownReference,
                        entity,
                        format!(
                            "reference target '{}.{}' is not in the batch",
                            schema, target.entity
                        ),
                    )
                    .with_field(&f.name),
                );
            }
        }
    }
}

fn check_indexes(entity: &Entity, errors: &mut Vec<StructuralError>) {
    for idx in &entity.indexes {
        for field in &idx.fields {
            if entity.field(field).is_none() {
                errors.push(
                    StructuralError::new(
                        StructuralErrorKind::UnknownField,
                        entity,
                        format!("index references unknown field '{}'", field),
                    )
                    .with_field(field),
                );
            }
        }
    }
}

fn check_actions(entities: &[Entity], entity: &Entity, errors: &mut Vec<StructuralError>) {
    let mut seen = BTreeSet::new();
    for action in &entity.actions {
        if !seen.insert(action.name.as_str()) {
            errors.push(
                StructuralError::new(
                    StructuralErrorKind::DuplicateAction,
                    entity,
                    format!("action '{}' declared more than once", action.name),
                )
                .with_action(&action.name),
            );
        }

        if let Some(requires) = &action.requires {
            check_condition(entity, &action.name, requires, errors);
        }

        for step in &action.steps {
            match step {
                Step::Validate { condition, .. } => {
                    check_condition(entity, &action.name, condition, errors);
                }
                Step::Update {
                    entity: target,
                    assignments,
                }
                | Step::Insert {
                    entity: target,
                    assignments,
                } => {
                    check_mutation(entities, entity, &action.name, target, assignments, errors);
                }
                Step::Call { .. } | Step::Notify { .. } => {}
            }
        }
    }
}

fn check_condition(
    entity: &Entity,
    action: &str,
    condition: &str,
    errors: &mut Vec<StructuralError>,
) {
    match Expr::parse(condition) {
        Ok(expr) => {
            for field in expr.fields() {
                if entity.field(field).is_none() {
                    errors.push(
                        StructuralError::new(
                            StructuralErrorKind::UnknownField,
                            entity,
                            format!("condition references unknown field '{}'", field),
                        )
                        .with_field(field)
                        .with_action(action),
                    );
                }
            }
        }
        Err(e) => {
            errors.push(
                StructuralError::new(
                    StructuralErrorKind::InvalidExpression,
                    entity,
                    e.to_string(),
                )
                .with_action(action),
            );
        }
    }
}

fn check_mutation(
    entities: &[Entity],
    owner: &Entity,
    action: &str,
    target: &str,
    assignments: &[Assignment],
    errors: &mut Vec<StructuralError>,
) {
    // A mutation may target the owner or any other entity in the batch;
    // bare names resolve same-schema first
    let resolved = entities
        .iter()
        .find(|e| e.schema == owner.schema && e.name == target)
        .or_else(|| {
            let mut matches = entities.iter().filter(|e| e.name == target);
            let first = matches.next();
            if matches.next().is_some() {
                None
            } else {
                first
            }
        });

    let Some(resolved) = resolved else {
        errors.push(
            StructuralError::new(
                StructuralErrorKind::UnknownReference,
                owner,
                format!("step targets unknown entity '{}'", target),
            )
            .with_action(action),
        );
        return;
    };

    for a in assignments {
        if resolved.field(&a.field).is_none() {
            errors.push(
                StructuralError::new(
                    StructuralErrorKind::UnknownField,
                    owner,
                    format!(
                        "step assigns unknown field '{}' of '{}'",
                        a.field, resolved.name
                    ),
                )
                .with_field(&a.field)
                .with_action(action),
            );
        }
    }
}

fn check_field_types(entity: &Entity, errors: &mut Vec<StructuralError>) {
    for f in &entity.fields {
        if let FieldType::Enum(values) = &f.ty {
            let mut seen = BTreeSet::new();
            for v in values {
                if !seen.insert(v.as_str()) {
                    errors.push(
                        StructuralError::new(
                            StructuralErrorKind::InvalidFieldType,
                            entity,
                            format!("enum value '{}' declared more than once", v),
                        )
                        .with_field(&f.name),
                    );
                }
            }
        }
        if let (FieldType::Enum(values), Some(default)) = (&f.ty, &f.default) {
            if !values.iter().any(|v| v == default) {
                errors.push(
                    StructuralError::new(
                        StructuralErrorKind::InvalidDefault,
                        entity,
                        format!(
                            "default '{}' is not one of the declared enum values",
                            default
                        ),
                    )
                    .with_field(&f.name),
                );
            }
        }
    }
}
