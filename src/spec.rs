use crate::graph::check_case_name;
use crate::types::{Parameters, TestCaseSpec, one_or_many};
use crate::t_args;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub stop_on_fail: Option<bool>,
    pub target: Option<String>,
    pub inventory: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawCase {
    pub name: String,
    #[serde(alias = "file")]
    pub module: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub depends: Vec<String>,
    #[serde(default)]
    pub parameters: Parameters,
    pub config: Option<serde_yaml::Value>,
    #[serde(default)]
    pub always_execute: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RawSpec {
    pub name: Option<String>,
    #[serde(default)]
    pub config: RawConfig,
    #[serde(alias = "test_cases")]
    pub tests: Vec<RawCase>,
}

/// One declaration file, parsed but not yet instantiated.
#[derive(Debug, Clone)]
pub struct SetSpec {
    pub name: String,
    pub file: PathBuf,
    pub stop_on_fail: bool,
    pub target: Option<String>,
    pub inventory: Option<PathBuf>,
    pub parameters: Parameters,
    pub cases: Vec<TestCaseSpec>,
}

fn is_spec_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

fn resolve_path_relative_to(path: &str, spec_file: &Path) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match spec_file.parent() {
        Some(dir) => dir.join(p),
        None => p.to_path_buf(),
    }
}

/// Expands directories (recursively, sorted) into declaration files.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for p in paths {
        if p.is_dir() {
            for entry in WalkDir::new(p).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && is_spec_file(entry.path()) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(p.clone());
        }
    }
    Ok(files)
}

pub fn parse_spec(content: &str, file: &Path) -> Result<SetSpec> {
    let raw: RawSpec = serde_yaml::from_str(content)
        .with_context(|| t_args!("spec-parse-error", "file" => file.display()))?;
    let name = raw
        .name
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "set".to_string());
    let cases = raw
        .tests
        .into_iter()
        .map(|c| {
            let name = c.name.trim().to_string();
            check_case_name(&name)
                .with_context(|| t_args!("spec-parse-error", "file" => file.display()))?;
            Ok(TestCaseSpec {
                name,
                module: c.module.map(|m| m.trim().to_string()),
                depends: c.depends,
                parameters: c.parameters,
                config: c.config,
                always_execute: c.always_execute,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SetSpec {
        name,
        file: file.to_path_buf(),
        stop_on_fail: raw.config.stop_on_fail.unwrap_or(false),
        target: raw.config.target,
        inventory: raw
            .config
            .inventory
            .map(|i| resolve_path_relative_to(i.trim(), file)),
        parameters: raw.config.parameters,
        cases,
    })
}

pub fn load_specs(paths: &[PathBuf]) -> Result<Vec<SetSpec>> {
    let mut out = Vec::new();
    for f in collect_files(paths)? {
        let content = fs::read_to_string(&f)
            .with_context(|| t_args!("spec-failed-to-read", "file" => f.display()))?;
        out.push(parse_spec(&content, &f)?);
    }
    Ok(out)
}
