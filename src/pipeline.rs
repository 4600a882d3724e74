//! Batch pipeline
//!
//! The whole surface an external driver needs: validate documents,
//! compile them to target code, synthesize tests, extract tests back,
//! and analyze coverage. All functions are pure with respect to the
//! filesystem and deterministic: per-entity work fans out across a rayon
//! pool after reference resolution, and results merge into ordered maps,
//! so parallel and sequential runs are byte-identical.

use crate::compile::compile_entity;
use crate::coverage::{self, CoverageReport};
use crate::extract::{self, detect_dialect, Dialect, Extraction, ExtractionWarning};
use crate::render::{self, Backend, EmissionError, FileMap};
use crate::spec::Entity;
use crate::testgen::{self, CategoryFilter};
use crate::testspec::TestSpec;
use crate::validate::{validate, Ir, StructuralError};
use rayon::prelude::*;
use thiserror::Error;

/// Explicit configuration threaded through the forward pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub backends: Vec<Backend>,
    pub categories: CategoryFilter,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            backends: Backend::ALL.to_vec(),
            categories: CategoryFilter::default(),
        }
    }
}

/// One problem in a batch, attributed to its source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("document {index}: {detail}")]
    Parse { index: usize, detail: String },
    #[error(transparent)]
    Structural(StructuralError),
    #[error("{entity}: {detail}")]
    Compile { entity: String, detail: String },
    #[error(transparent)]
    Emission(#[from] EmissionError),
}

/// Outcome of validating a batch: the parsed entities plus every error
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub entities: Vec<Entity>,
    pub errors: Vec<BatchError>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Files produced for the emittable part of a batch, plus the errors
/// that kept the rest out
#[derive(Debug, Clone, Default)]
pub struct CompileOutcome {
    pub files: FileMap,
    pub errors: Vec<BatchError>,
}

/// Parse and validate a batch of YAML documents, collecting every error
pub fn validate_docs(docs: &[&str]) -> ValidationResult {
    let mut entities = Vec::new();
    let mut errors = Vec::new();

    for (index, doc) in docs.iter().enumerate() {
        match Entity::from_yaml(doc) {
            Ok(entity) => entities.push(entity),
            Err(e) => errors.push(BatchError::Parse {
                index,
                detail: e.to_string(),
            }),
        }
    }

    if let Err(structural) = validate(&entities) {
        errors.extend(structural.into_iter().map(BatchError::Structural));
    }

    ValidationResult { entities, errors }
}

/// Compile a batch to generated code for the configured backends.
/// Entities with validation or emission problems contribute errors; the
/// rest of the batch still produces files.
pub fn compile_docs(docs: &[&str], config: &PipelineConfig) -> CompileOutcome {
    let (ir, mut errors) = resolve_batch(docs);
    let Some(ir) = ir else {
        return CompileOutcome {
            files: FileMap::new(),
            errors,
        };
    };

    let mut files = FileMap::new();
    for &backend in &config.backends {
        files.extend(render::emit_prelude(backend));
    }

    // parallel per entity; collected in batch order so the merge is
    // deterministic
    let results: Vec<(FileMap, Vec<BatchError>)> = ir
        .entities()
        .par_iter()
        .map(|entity| emit_one(&ir, entity, config))
        .collect();

    for (map, errs) in results {
        files.extend(map);
        errors.extend(errs);
    }

    CompileOutcome { files, errors }
}

/// Emit one entity for every configured backend. A backend that rejects
/// the entity contributes an error without suppressing the others.
fn emit_one(ir: &Ir, entity: &Entity, config: &PipelineConfig) -> (FileMap, Vec<BatchError>) {
    let actions = match compile_entity(ir, entity) {
        Ok(actions) => actions,
        Err(e) => {
            let error = BatchError::Compile {
                entity: entity.name.clone(),
                detail: e.to_string(),
            };
            return (FileMap::new(), vec![error]);
        }
    };

    let mut files = FileMap::new();
    let mut errors = Vec::new();
    for &backend in &config.backends {
        match render::emit_entity(backend, ir, entity, &actions) {
            Ok(map) => files.extend(map),
            Err(e) => errors.push(BatchError::Emission(e)),
        }
    }
    (files, errors)
}

/// Synthesize test scenarios for a batch and render both test dialects
pub fn synthesize_tests(docs: &[&str], config: &PipelineConfig) -> CompileOutcome {
    let (ir, errors) = resolve_batch(docs);
    let Some(ir) = ir else {
        return CompileOutcome {
            files: FileMap::new(),
            errors,
        };
    };

    let results: Vec<FileMap> = ir
        .entities()
        .par_iter()
        .map(|entity| {
            let spec = testgen::synthesize_filtered(&ir, entity, config.categories);
            let mut files = testgen::pgtap::render(&spec);
            files.extend(testgen::pytest::render(&spec));
            files
        })
        .collect();

    let mut files = FileMap::new();
    for map in results {
        files.extend(map);
    }
    CompileOutcome { files, errors }
}

/// Synthesized scenarios for a batch, without rendering
pub fn synthesize_specs(docs: &[&str]) -> Result<Vec<TestSpec>, Vec<BatchError>> {
    let (ir, errors) = resolve_batch(docs);
    match ir {
        Some(ir) if errors.is_empty() => Ok(testgen::synthesize(&ir)),
        _ => Err(errors),
    }
}

/// Recover a test specification from an existing test file. With no
/// dialect given the content is sniffed; unidentifiable input yields an
/// empty spec plus a warning, never an error.
pub fn extract_tests(source: &str, dialect: Option<Dialect>) -> Extraction {
    match dialect.or_else(|| detect_dialect(source)) {
        Some(dialect) => extract::extract(source, dialect),
        None => Extraction {
            spec: TestSpec {
                entity: "Unknown".to_string(),
                schema: "public".to_string(),
                scenarios: Vec::new(),
            },
            warnings: vec![ExtractionWarning {
                line: 1,
                detail: "could not detect a test dialect".to_string(),
            }],
        },
    }
}

/// Compare recovered tests against expected ones
pub fn analyze_coverage(recovered: &TestSpec, expected: &TestSpec) -> CoverageReport {
    coverage::analyze(recovered, expected)
}

/// Parse + validate, then keep re-validating without the failing
/// entities so the healthy remainder of the batch still compiles
fn resolve_batch(docs: &[&str]) -> (Option<Ir>, Vec<BatchError>) {
    let result = validate_docs(docs);
    if result.is_ok() {
        // zero errors means validate() must succeed on the same input
        return match validate(&result.entities) {
            Ok(ir) => (Some(ir), Vec::new()),
            Err(errs) => (
                None,
                errs.into_iter().map(BatchError::Structural).collect(),
            ),
        };
    }

    let errors = result.errors.clone();
    let mut entities = result.entities;
    loop {
        match validate(&entities) {
            Ok(ir) => return (Some(ir), errors),
            Err(errs) => {
                // prune by schema-qualified name; a broken crm.Contact must
                // not take a healthy billing.Contact with it
                let failing: Vec<(String, String)> = errs
                    .iter()
                    .map(|e| (e.schema.clone(), e.entity.clone()))
                    .collect();
                let before = entities.len();
                entities.retain(|e| {
                    !failing
                        .iter()
                        .any(|(schema, name)| schema == &e.schema && name == &e.name)
                });
                if entities.is_empty() || entities.len() == before {
                    return (None, errors);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testspec::Category;

    const CONTACT: &str = r#"
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
"#;

    const BROKEN: &str = r#"
entity: Broken
schema: crm
fields:
  target: ref(Nowhere)
"#;

    #[test]
    fn validate_docs_collects_parse_and_structural_errors() {
        let result = validate_docs(&["entity: X\nfields:\n  a: varchar\n", BROKEN]);
        assert_eq!(result.errors.len(), 2);
        assert!(matches!(result.errors[0], BatchError::Parse { index: 0, .. }));
        assert!(matches!(result.errors[1], BatchError::Structural(_)));
    }

    #[test]
    fn compile_docs_emits_for_all_configured_backends() {
        let outcome = compile_docs(&[CONTACT], &PipelineConfig::default());
        assert!(outcome.errors.is_empty());
        assert!(outcome.files.contains_key("sql/app/types.sql"));
        assert!(outcome.files.contains_key("sql/crm/tb_contact.sql"));
        assert!(outcome.files.contains_key("sql/crm/fn_contact_promote.sql"));
        assert!(outcome.files.contains_key("python/contact.py"));
        assert!(outcome.files.contains_key("typescript/contact.ts"));
        assert!(outcome.files.contains_key("rust/contact.rs"));
    }

    #[test]
    fn compile_docs_is_deterministic_and_idempotent() {
        let config = PipelineConfig::default();
        let a = compile_docs(&[CONTACT], &config);
        let b = compile_docs(&[CONTACT], &config);
        assert_eq!(a.files, b.files);
    }

    #[test]
    fn partial_batch_still_emits_healthy_entities() {
        let outcome = compile_docs(&[CONTACT, BROKEN], &PipelineConfig::default());
        assert!(!outcome.errors.is_empty());
        assert!(outcome.files.contains_key("sql/crm/tb_contact.sql"));
        assert!(!outcome.files.keys().any(|k| k.contains("broken")));
    }

    #[test]
    fn backend_selection_is_honored() {
        let config = PipelineConfig {
            backends: vec![Backend::Python],
            categories: CategoryFilter::default(),
        };
        let outcome = compile_docs(&[CONTACT], &config);
        assert!(outcome.files.contains_key("python/contact.py"));
        assert!(!outcome.files.keys().any(|k| k.starts_with("sql/")));
    }

    #[test]
    fn synthesize_tests_renders_both_dialects() {
        let outcome = synthesize_tests(&[CONTACT], &PipelineConfig::default());
        assert!(outcome.errors.is_empty());
        assert!(outcome.files.contains_key("tests/pgtap/test_contact.sql"));
        assert!(outcome.files.contains_key("tests/pytest/test_contact.py"));
    }

    #[test]
    fn extract_tests_sniffs_dialect() {
        let outcome = synthesize_tests(&[CONTACT], &PipelineConfig::default());
        let sql = &outcome.files["tests/pgtap/test_contact.sql"];
        let extraction = extract_tests(sql, None);
        assert_eq!(extraction.spec.entity, "Contact");
        assert!(extraction
            .spec
            .scenarios
            .iter()
            .any(|s| s.category == Category::Action));
    }

    #[test]
    fn undetectable_input_yields_warning_not_error() {
        let extraction = extract_tests("once upon a time", None);
        assert!(extraction.spec.scenarios.is_empty());
        assert_eq!(extraction.warnings.len(), 1);
    }

    #[test]
    fn coverage_end_to_end() {
        let specs = synthesize_specs(&[CONTACT]).unwrap();
        let rendered = testgen::pgtap::render(&specs[0]);
        let extraction = extract_tests(&rendered["tests/pgtap/test_contact.sql"], None);
        let report = analyze_coverage(&extraction.spec, &specs[0]);
        assert!(report.missing.is_empty(), "missing: {:?}", report.missing);
    }
}
