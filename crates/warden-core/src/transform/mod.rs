//! The transform engine: deterministic patch application and verification.
//!
//! Stateless between calls. Within one `apply`, patches run in list order
//! and files per patch in lexicographic order; nothing touches disk until
//! every patch has been planned, so a failed apply leaves every targeted
//! file byte-identical to its pre-image.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_exec::CommandRunner;

use crate::changespec::{AstOp, ChangeSpec};
use crate::error::{Result, WardenError};
use crate::selector::Selector;

pub mod invariants;
pub mod lang;
pub mod mutation;
pub mod ops;

pub use invariants::{run_invariants, InvariantResult, InvariantRun};
pub use lang::{LanguagePack, LanguageRegistry, StubPack, TsJsPack};
pub use mutation::{MutationConfig, MutationReport};
pub use ops::Edit;

/// Directories excluded from scope expansion and source searches.
pub(crate) const EXCLUDED_DIRS: &[&str] = &["node_modules", "dist", "build", "target", ".git"];

/// One structured entry in the apply result's error channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineIssue {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

/// Result of applying a spec's patches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub success: bool,
    pub files_modified: Vec<String>,
    pub errors: Vec<EngineIssue>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

/// Result of verifying a spec's post-conditions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub invariants: Vec<InvariantResult>,
    pub mutation_report: MutationReport,
}

/// Apply-time switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub dry_run: bool,
}

/// The engine itself. Holds only configuration and the pack registry.
pub struct TransformEngine {
    registry: LanguageRegistry,
    mutation: MutationConfig,
    command_deadline: Duration,
}

impl TransformEngine {
    pub fn new() -> Self {
        Self {
            registry: LanguageRegistry::with_default_packs(),
            mutation: MutationConfig::default(),
            command_deadline: Duration::from_secs(300),
        }
    }

    pub fn with_mutation_config(mut self, config: MutationConfig) -> Self {
        self.mutation = config;
        self
    }

    /// Override the deadline for shell-based invariants.
    pub fn with_command_deadline(mut self, deadline: Duration) -> Self {
        self.command_deadline = deadline;
        self
    }

    pub fn registry_mut(&mut self) -> &mut LanguageRegistry {
        &mut self.registry
    }

    /// Apply every patch of the spec under `workdir`.
    pub async fn apply(
        &self,
        spec: &ChangeSpec,
        workdir: &Path,
        options: ApplyOptions,
    ) -> Result<ApplyResult> {
        spec.validate()?;
        let pack = self.registry.get(spec.language)?;

        let mut errors: Vec<EngineIssue> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        // Staged contents, keyed by absolute path. Later patches see the
        // output of earlier ones; disk is untouched until the end.
        let mut staged: BTreeMap<PathBuf, String> = BTreeMap::new();
        let mut files_modified: Vec<String> = Vec::new();
        let mut modified_set: HashSet<PathBuf> = HashSet::new();

        if spec.patches.iter().any(|p| p.ast_op == AstOp::RenameSymbol) {
            warnings.push(
                "renameSymbol rewrites identifier tokens without binding analysis; \
                 shadowed bindings are renamed too"
                    .to_string(),
            );
        }

        for patch in &spec.patches {
            match patch.ast_op {
                AstOp::RenameSymbol | AstOp::ReplaceApi => {}
                other => {
                    errors.push(EngineIssue {
                        kind: "UnsupportedOperation".to_string(),
                        path: Some(patch.path.clone()),
                        message: format!("astOp {} is not supported in v1", other.as_str()),
                    });
                    continue;
                }
            }

            let selector = match Selector::parse(patch.selector.as_deref().unwrap_or_default()) {
                Ok(selector) => selector,
                Err(e) => {
                    errors.push(EngineIssue {
                        kind: "InvalidSelector".to_string(),
                        path: Some(patch.path.clone()),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            let shape_ok = matches!(
                (patch.ast_op, &selector),
                (AstOp::RenameSymbol, Selector::Identifier { .. })
                    | (AstOp::ReplaceApi, Selector::CallExpression { .. })
            );
            if !shape_ok {
                errors.push(EngineIssue {
                    kind: "InvalidSelector".to_string(),
                    path: Some(patch.path.clone()),
                    message: format!(
                        "selector shape does not match astOp {}",
                        patch.ast_op.as_str()
                    ),
                });
                continue;
            }

            let files = match resolve_scope(workdir, &patch.path) {
                Ok(files) => files,
                Err(e) => {
                    errors.push(EngineIssue {
                        kind: issue_kind(&e),
                        path: Some(patch.path.clone()),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for file in files {
                let content = match staged.get(&file) {
                    Some(content) => content.clone(),
                    None => match std::fs::read_to_string(&file) {
                        Ok(content) => content,
                        Err(e) => {
                            errors.push(EngineIssue {
                                kind: "IOError".to_string(),
                                path: Some(display_relative(workdir, &file)),
                                message: e.to_string(),
                            });
                            continue;
                        }
                    },
                };

                let tree = match pack.parse(&content, &file) {
                    Ok(tree) => tree,
                    Err(e) => {
                        errors.push(EngineIssue {
                            kind: issue_kind(&e),
                            path: Some(display_relative(workdir, &file)),
                            message: e.to_string(),
                        });
                        // A parse failure aborts this patch; later patches
                        // still run.
                        break;
                    }
                };

                let edits = match pack.plan_patch(&tree, &content, &selector, patch) {
                    Ok(edits) => edits,
                    Err(e) => {
                        errors.push(EngineIssue {
                            kind: issue_kind(&e),
                            path: Some(display_relative(workdir, &file)),
                            message: e.to_string(),
                        });
                        break;
                    }
                };
                if edits.is_empty() {
                    continue;
                }

                let rewritten = pack.generate(&content, edits);
                if !pack.validate(&rewritten, &file) {
                    warnings.push(format!(
                        "{}: rewritten source no longer parses cleanly",
                        display_relative(workdir, &file)
                    ));
                }
                staged.insert(file.clone(), rewritten);
                if modified_set.insert(file.clone()) {
                    files_modified.push(display_relative(workdir, &file));
                }
            }
        }

        let success = errors.is_empty();
        if success && !options.dry_run {
            for (file, content) in &staged {
                tokio::fs::write(file, content).await?;
            }
        }

        Ok(ApplyResult {
            success,
            files_modified,
            errors,
            warnings,
            dry_run: options.dry_run,
        })
    }

    /// Run the spec's invariants and mutation gate against `workdir`.
    pub async fn verify(&self, spec: &ChangeSpec, workdir: &Path) -> Result<VerifyResult> {
        spec.validate()?;
        let runner = CommandRunner::new(self.command_deadline);
        let run = run_invariants(spec, workdir, &runner).await;

        let mut errors: Vec<String> = run
            .results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("{}: {}", r.name, r.message))
            .collect();
        let mut warnings = run.warnings.clone();

        let threshold = spec.tests.mutation_threshold;
        let mutation_report =
            match mutation::run_mutation_tests(threshold, workdir, &self.mutation).await {
                Ok(report) => {
                    if report.synthesized {
                        warnings.push(
                            "mutation report synthesized at threshold; reject in CI".to_string(),
                        );
                    }
                    report
                }
                Err(e) => {
                    errors.push(format!("mutation run failed: {e}"));
                    MutationReport {
                        score: 0.0,
                        threshold,
                        total: 0,
                        killed: 0,
                        synthesized: false,
                        mutants: Vec::new(),
                    }
                }
            };

        let success = run.all_passed() && errors.is_empty() && mutation_report.score >= threshold;
        Ok(VerifyResult {
            success,
            errors,
            warnings,
            invariants: run.results,
            mutation_report,
        })
    }
}

impl Default for TransformEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn issue_kind(error: &WardenError) -> String {
    error.code().to_string()
}

fn display_relative(workdir: &Path, file: &Path) -> String {
    file.strip_prefix(workdir)
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Resolve a patch path to concrete files: literal when it exists, glob
/// expansion otherwise. Build output and dependency directories are always
/// excluded, and the result is lexicographically sorted.
fn resolve_scope(workdir: &Path, path: &str) -> Result<Vec<PathBuf>> {
    let literal = workdir.join(path);
    if literal.is_file() {
        return Ok(vec![literal]);
    }

    let pattern = literal.to_string_lossy().into_owned();
    let entries = glob::glob(&pattern)
        .map_err(|e| WardenError::InvalidChangeSpec(format!("bad scope glob {path:?}: {e}")))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|p| p.is_file() && !is_excluded(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map_or(false, |name| EXCLUDED_DIRS.contains(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_dirs_are_filtered() {
        assert!(is_excluded(Path::new("a/node_modules/b.ts")));
        assert!(is_excluded(Path::new("dist/out.js")));
        assert!(!is_excluded(Path::new("src/distance.ts")));
    }
}
