// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # Specforge — declarative entity specification compiler
//!
//! Spec-driven schema, code, and test generation for data-centric
//! applications.
//!
//! ## Core Concept
//!
//! Specforge treats **entity specifications** as the source of truth. A
//! spec defines an entity's fields and its business actions. From this
//! single spec, specforge can:
//!
//! - **Validate** the whole batch structurally (references, duplicates,
//!   expressions) with every error reported, never just the first
//! - **Compile** actions into an ordered operation sequence
//! - **Generate** code for four targets: PostgreSQL DDL + PL/pgSQL
//!   routines, Python dataclasses, TypeScript modules, Rust modules
//! - **Synthesize tests** in two dialects (pgTAP and pytest) from one
//!   shared scenario list
//! - **Extract** test scenarios back out of existing test files
//! - **Analyze coverage** by diffing recovered tests against expected ones
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use specforge::{compile_docs, synthesize_tests, PipelineConfig};
//!
//! let doc = r#"
//! entity: Contact
//! schema: crm
//! fields:
//!   email: text! unique
//!   status: enum(lead, customer) = lead
//! actions:
//!   - name: promote
//!     steps:
//!       - validate: "status = 'lead'"
//!         error: not_a_lead
//!       - update: "Contact SET status = 'customer'"
//! "#;
//!
//! let outcome = compile_docs(&[doc], &PipelineConfig::default());
//! for (path, content) in &outcome.files {
//!     std::fs::write(path, content)?;
//! }
//!
//! let tests = synthesize_tests(&[doc], &PipelineConfig::default());
//! ```
//!
//! ## Spec Format
//!
//! Entities are YAML documents with a shorthand field grammar:
//!
//! ```yaml
//! entity: Contact
//! schema: crm
//! fields:
//!   email: text! unique          # required, unique
//!   status: enum(lead, customer) = lead
//!   company: ref(Company)        # foreign key
//! actions:
//!   - name: promote
//!     requires: "status = 'lead'"
//!     steps:
//!       - update: "Contact SET status = 'customer'"
//!       - notify: "owner: contact promoted"
//! ```
//!
//! ## Architecture
//!
//! ```text
//! YAML docs ──► validate ──► IR ──► compile ──► render ──► FileMap
//!                                      │
//!                                      └──► testgen ──► pgTAP + pytest
//!
//! test files ──► extract ──► TestSpec ──► coverage ──► CoverageReport
//! ```
//!
//! Every pipeline output is deterministic: files land in ordered maps,
//! generated content carries a content hash instead of a timestamp, and
//! per-entity parallelism never changes the merged result.

// Core model
pub mod compile;
pub mod error;
pub mod expr;
pub mod spec;
pub mod util;
pub mod validate;

// Forward pipeline: spec to code and tests
pub mod pipeline;
pub mod render;
pub mod testgen;
pub mod testspec;

// Reverse pipeline: tests back to specs
pub mod coverage;
pub mod extract;

pub use compile::{compile_action, compile_entity, CompileError, CompiledAction, CompiledOp};
pub use coverage::{analyze, CategoryCoverage, CoverageReport};
pub use error::{Error, Result};
pub use expr::{BinOp, Expr, Literal};
pub use extract::{detect_dialect, Dialect, Extraction, ExtractionWarning};
pub use pipeline::{
    analyze_coverage, compile_docs, extract_tests, synthesize_specs, synthesize_tests,
    validate_docs, BatchError, CompileOutcome, PipelineConfig, ValidationResult,
};
pub use render::{emit_entity, emit_prelude, Backend, EmissionError, FileMap};
pub use spec::{Action, Assignment, Entity, Field, FieldType, Index, RefTarget, Step};
pub use testgen::{synthesize, synthesize_entity, synthesize_filtered, CategoryFilter};
pub use testspec::{Assertion, AssertionKind, Category, TestScenario, TestSpec, TestStep};
pub use validate::{validate, Ir, StructuralError, StructuralErrorKind};
