//! Action compilation
//!
//! Lowers a validated entity's actions into target-independent operation
//! sequences. Each [`CompiledOp`] carries pre-parsed expressions, so the
//! emitters never parse condition strings themselves.

use crate::expr::Expr;
use crate::spec::{Action, Assignment, Entity, Step};
use crate::validate::Ir;
use thiserror::Error;

/// A fully lowered action, ready for any emitter
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAction {
    pub entity: String,
    pub schema: String,
    pub name: String,
    pub ops: Vec<CompiledOp>,
}

/// One target-independent operation
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledOp {
    /// Authorization gate from the `requires` clause; failing it rejects
    /// the whole action before any step runs
    CheckAuth { condition: Expr },
    /// Condition check; on failure the action short-circuits with the tag
    Validate { condition: Expr, tag: String },
    Update {
        entity: String,
        schema: String,
        assignments: Vec<Assignment>,
    },
    Insert {
        entity: String,
        schema: String,
        assignments: Vec<Assignment>,
    },
    Call { function: String },
    Notify { recipient: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("{entity}.{action}: cannot parse condition: {detail}")]
    Condition {
        entity: String,
        action: String,
        detail: String,
    },
    #[error("{entity}.{action}: step targets unknown entity '{target}'")]
    UnknownTarget {
        entity: String,
        action: String,
        target: String,
    },
}

/// Compile every action of one entity
pub fn compile_entity(ir: &Ir, entity: &Entity) -> Result<Vec<CompiledAction>, CompileError> {
    entity
        .actions
        .iter()
        .map(|a| compile_action(ir, entity, a))
        .collect()
}

/// Compile one action. Every `validate` step gets a failure tag: the
/// user-supplied one, or `{action}_{index}_failed` with the step's
/// 1-based position.
pub fn compile_action(
    ir: &Ir,
    entity: &Entity,
    action: &Action,
) -> Result<CompiledAction, CompileError> {
    let mut ops = Vec::with_capacity(action.steps.len() + 1);

    if let Some(requires) = &action.requires {
        let condition = parse_condition(entity, action, requires)?;
        ops.push(CompiledOp::CheckAuth { condition });
    }

    for (index, step) in action.steps.iter().enumerate() {
        match step {
            Step::Validate { condition, error } => {
                let condition = parse_condition(entity, action, condition)?;
                let tag = error
                    .clone()
                    .unwrap_or_else(|| format!("{}_{}_failed", action.name, index + 1));
                ops.push(CompiledOp::Validate { condition, tag });
            }
            Step::Update {
                entity: target,
                assignments,
            } => {
                let resolved = resolve_target(ir, entity, action, target)?;
                ops.push(CompiledOp::Update {
                    entity: resolved.0,
                    schema: resolved.1,
                    assignments: assignments.clone(),
                });
            }
            Step::Insert {
                entity: target,
                assignments,
            } => {
                let resolved = resolve_target(ir, entity, action, target)?;
                ops.push(CompiledOp::Insert {
                    entity: resolved.0,
                    schema: resolved.1,
                    assignments: assignments.clone(),
                });
            }
            Step::Call { function } => {
                ops.push(CompiledOp::Call {
                    function: function.clone(),
                });
            }
            Step::Notify { recipient, message } => {
                ops.push(CompiledOp::Notify {
                    recipient: recipient.clone(),
                    message: message.clone(),
                });
            }
        }
    }

    Ok(CompiledAction {
        entity: entity.name.clone(),
        schema: entity.schema.clone(),
        name: action.name.clone(),
        ops,
    })
}

fn parse_condition(
    entity: &Entity,
    action: &Action,
    condition: &str,
) -> Result<Expr, CompileError> {
    Expr::parse(condition).map_err(|e| CompileError::Condition {
        entity: entity.name.clone(),
        action: action.name.clone(),
        detail: e.to_string(),
    })
}

fn resolve_target(
    ir: &Ir,
    owner: &Entity,
    action: &Action,
    target: &str,
) -> Result<(String, String), CompileError> {
    ir.resolve(owner, target)
        .map(|e| (e.name.clone(), e.schema.clone()))
        .ok_or_else(|| CompileError::UnknownTarget {
            entity: owner.name.clone(),
            action: action.name.clone(),
            target: target.to_string(),
        })
}
