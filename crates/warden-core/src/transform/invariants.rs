//! Post-condition verification: the invariant runner.
//!
//! Invariants run sequentially; one failure never aborts the rest. Every
//! outcome is a structured entry, including the unknown-type case.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

use warden_exec::{CommandRunner, ExecError};

use crate::changespec::{ChangeSpec, InvariantSpec};
use crate::types::Language;

use super::EXCLUDED_DIRS;

lazy_static! {
    static ref SEMANTIC_RULE_RE: Regex =
        Regex::new(r"(?i)^\s*no\s+calls\s+to\s+(.+?)\s*$").unwrap();
}

/// Structured outcome of one invariant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvariantResult {
    pub name: String,
    pub kind: String,
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// All invariant outcomes plus runner-level warnings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvariantRun {
    pub results: Vec<InvariantResult>,
    pub warnings: Vec<String>,
}

impl InvariantRun {
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

/// Run every invariant of the spec against `workdir`.
pub async fn run_invariants(
    spec: &ChangeSpec,
    workdir: &Path,
    runner: &CommandRunner,
) -> InvariantRun {
    let mut results = Vec::with_capacity(spec.invariants.len());
    let mut warnings = Vec::new();

    for invariant in &spec.invariants {
        let result = match invariant.kind.as_str() {
            "typecheck" => run_typecheck(invariant, workdir, runner).await,
            "symbolExists" => run_symbol_exists(invariant, workdir, spec.language),
            "regex" => run_regex(invariant, workdir, spec.language),
            "semanticRule" => run_semantic_rule(invariant, workdir, spec.language, &mut warnings),
            "apiCompat" => {
                warnings.push(format!(
                    "invariant {}: apiCompat is reserved and treated as pass",
                    invariant.name
                ));
                InvariantResult {
                    name: invariant.name.clone(),
                    kind: invariant.kind.clone(),
                    passed: true,
                    message: "apiCompat reserved; treated as pass".to_string(),
                    output: None,
                }
            }
            other => {
                tracing::error!(invariant = %invariant.name, kind = %other, "unknown invariant type");
                InvariantResult {
                    name: invariant.name.clone(),
                    kind: invariant.kind.clone(),
                    passed: false,
                    message: format!("unknown invariant type {other:?}"),
                    output: None,
                }
            }
        };
        results.push(result);
    }

    InvariantRun { results, warnings }
}

async fn run_typecheck(
    invariant: &InvariantSpec,
    workdir: &Path,
    runner: &CommandRunner,
) -> InvariantResult {
    match runner.run_shell(&invariant.spec, workdir).await {
        Ok(output) => {
            let combined = format!("{}{}", output.stdout, output.stderr);
            InvariantResult {
                name: invariant.name.clone(),
                kind: invariant.kind.clone(),
                passed: output.success,
                message: if output.success {
                    "typecheck passed".to_string()
                } else {
                    format!("typecheck exited with code {}", output.exit_code)
                },
                output: Some(combined),
            }
        }
        Err(ExecError::Timeout(deadline)) => InvariantResult {
            name: invariant.name.clone(),
            kind: invariant.kind.clone(),
            passed: false,
            message: format!("typecheck timed out after {deadline:?}"),
            output: None,
        },
        Err(e) => InvariantResult {
            name: invariant.name.clone(),
            kind: invariant.kind.clone(),
            passed: false,
            message: format!("typecheck could not run: {e}"),
            output: None,
        },
    }
}

fn run_symbol_exists(
    invariant: &InvariantSpec,
    workdir: &Path,
    language: Language,
) -> InvariantResult {
    let symbol = invariant.spec.trim();
    let matches = search_sources(workdir, language, |content| content.contains(symbol));
    InvariantResult {
        name: invariant.name.clone(),
        kind: invariant.kind.clone(),
        passed: !matches.is_empty(),
        message: if matches.is_empty() {
            format!("symbol {symbol:?} not found in any source file")
        } else {
            format!("symbol {symbol:?} found in {} file(s)", matches.len())
        },
        output: None,
    }
}

fn run_regex(invariant: &InvariantSpec, workdir: &Path, language: Language) -> InvariantResult {
    let regex = match Regex::new(&invariant.spec) {
        Ok(regex) => regex,
        Err(e) => {
            return InvariantResult {
                name: invariant.name.clone(),
                kind: invariant.kind.clone(),
                passed: false,
                message: format!("invalid regex: {e}"),
                output: None,
            }
        }
    };
    let matches = search_sources(workdir, language, |content| regex.is_match(content));
    InvariantResult {
        name: invariant.name.clone(),
        kind: invariant.kind.clone(),
        passed: !matches.is_empty(),
        message: if matches.is_empty() {
            "pattern not found".to_string()
        } else {
            format!("pattern found in {} file(s)", matches.len())
        },
        output: None,
    }
}

/// The only decoded phrase is `no calls to <X>`; everything else passes
/// with a basic-validation warning.
fn run_semantic_rule(
    invariant: &InvariantSpec,
    workdir: &Path,
    language: Language,
    warnings: &mut Vec<String>,
) -> InvariantResult {
    let Some(caps) = SEMANTIC_RULE_RE.captures(&invariant.spec) else {
        warnings.push(format!(
            "invariant {}: rule {:?} not decodable, basic validation only",
            invariant.name, invariant.spec
        ));
        return InvariantResult {
            name: invariant.name.clone(),
            kind: invariant.kind.clone(),
            passed: true,
            message: "rule not decodable; basic validation only".to_string(),
            output: None,
        };
    };

    let target = caps[1].to_string();
    let offenders = search_sources(workdir, language, |content| content.contains(&target));
    InvariantResult {
        name: invariant.name.clone(),
        kind: invariant.kind.clone(),
        passed: offenders.is_empty(),
        message: if offenders.is_empty() {
            format!("no calls to {target}")
        } else {
            format!("found calls to {target} in {} file(s)", offenders.len())
        },
        output: (!offenders.is_empty()).then(|| offenders.join("\n")),
    }
}

/// Recursive scan over the language's source files, skipping build output
/// and dependency directories. Returns the matching paths.
fn search_sources<F>(workdir: &Path, language: Language, predicate: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let extensions = language.source_extensions();
    let mut matches = Vec::new();

    let walker = walkdir::WalkDir::new(workdir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !EXCLUDED_DIRS.contains(&name.as_ref())
        });

    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        if !extensions.contains(&ext) {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(path) {
            if predicate(&content) {
                matches.push(path.display().to_string());
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changespec::{ChangeSpec, TestPlan, TestStrategy};
    use crate::types::RiskLevel;
    use std::time::Duration;

    fn spec_with(invariants: Vec<InvariantSpec>) -> ChangeSpec {
        ChangeSpec {
            id: "CS-1".to_string(),
            intent: "test".to_string(),
            scope: vec!["src".to_string()],
            language: Language::Typescript,
            assumptions: vec![],
            patches: vec![],
            invariants,
            tests: TestPlan {
                strategy: TestStrategy::Augment,
                targets: vec![],
                mutation_threshold: 0.5,
            },
            risk: RiskLevel::Medium,
            telemetry: None,
        }
    }

    fn invariant(name: &str, kind: &str, spec: &str) -> InvariantSpec {
        InvariantSpec {
            name: name.to_string(),
            kind: kind.to_string(),
            spec: spec.to_string(),
        }
    }

    fn runner() -> CommandRunner {
        CommandRunner::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn typecheck_passes_on_exit_zero() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_with(vec![
            invariant("ok", "typecheck", "true"),
            invariant("bad", "typecheck", "exit 2"),
        ]);

        let run = run_invariants(&spec, dir.path(), &runner()).await;
        assert!(run.results[0].passed);
        assert!(!run.results[1].passed);
        assert!(run.results[1].message.contains("code 2"));
    }

    #[tokio::test]
    async fn symbol_exists_searches_source_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/api.ts"), "export function fetchUser() {}").unwrap();
        // Dependency dirs are never searched.
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.ts"), "hiddenSymbol").unwrap();

        let spec = spec_with(vec![
            invariant("present", "symbolExists", "fetchUser"),
            invariant("absent", "symbolExists", "hiddenSymbol"),
        ]);
        let run = run_invariants(&spec, dir.path(), &runner()).await;
        assert!(run.results[0].passed);
        assert!(!run.results[1].passed);
    }

    #[tokio::test]
    async fn regex_invariant_asserts_presence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "const version = '2.4.1';").unwrap();

        let spec = spec_with(vec![
            invariant("has-version", "regex", r"\d+\.\d+\.\d+"),
            invariant("bad-regex", "regex", r"[unclosed"),
        ]);
        let run = run_invariants(&spec, dir.path(), &runner()).await;
        assert!(run.results[0].passed);
        assert!(!run.results[1].passed);
        assert!(run.results[1].message.contains("invalid regex"));
    }

    #[tokio::test]
    async fn semantic_rule_decodes_no_calls_to() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "eval('1 + 1');").unwrap();

        let spec = spec_with(vec![
            invariant("ban-eval", "semanticRule", "no calls to eval"),
            invariant("ban-exec", "semanticRule", "No Calls To childProcess"),
            invariant("vague", "semanticRule", "functions should be pure"),
        ]);
        let run = run_invariants(&spec, dir.path(), &runner()).await;
        assert!(!run.results[0].passed);
        assert!(run.results[1].passed);
        assert!(run.results[2].passed);
        assert_eq!(run.warnings.len(), 1);
    }

    #[tokio::test]
    async fn api_compat_and_unknown_types_are_handled() {
        let dir = tempfile::tempdir().unwrap();
        let spec = spec_with(vec![
            invariant("compat", "apiCompat", "v1"),
            invariant("mystery", "quantumCheck", "??"),
        ]);
        let run = run_invariants(&spec, dir.path(), &runner()).await;
        assert!(run.results[0].passed);
        assert!(!run.results[1].passed);
        assert!(run.results[1].message.contains("unknown invariant type"));
        assert!(!run.all_passed());
    }
}
