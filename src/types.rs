use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::{self, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Free-form parameter mapping handed to a case factory.
pub type Parameters = IndexMap<String, serde_yaml::Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCaseSpec {
    pub name: String,
    pub module: Option<String>,
    pub depends: Vec<String>,
    pub parameters: Parameters,
    pub config: Option<serde_yaml::Value>,
    pub always_execute: bool,
}

impl TestCaseSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn always_execute(mut self, yes: bool) -> Self {
        self.always_execute = yes;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Registry key: the declared module with any file extension stripped,
    /// or the case name when no module was declared.
    pub fn module_key(&self) -> &str {
        match self.module.as_deref() {
            Some(m) => match m.rsplit_once('.') {
                Some((stem, _ext)) if !stem.is_empty() => stem,
                _ => m,
            },
            None => &self.name,
        }
    }
}

/// Shared state every case receives at run time.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub target: Option<String>,
    pub inventory: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// What a case reports back when its body completed without an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseOutput {
    pub passed: bool,
    pub message: Option<String>,
    pub output: String,
}

impl CaseOutput {
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            output: String::new(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaseStatus::Passed => "passed",
            CaseStatus::Failed => "failed",
            CaseStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub name: String,
    pub module: String,
    pub status: CaseStatus,
    pub message: Option<String>,
    pub output: String,
    pub duration: Duration,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub name: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
    pub cases: Vec<CaseResult>,
}

impl Summary {
    pub fn from_results(name: impl Into<String>, cases: Vec<CaseResult>, duration: Duration) -> Self {
        let mut summary = Summary {
            name: name.into(),
            duration,
            ..Default::default()
        };
        for c in &cases {
            match c.status {
                CaseStatus::Passed => summary.passed += 1,
                CaseStatus::Failed => summary.failed += 1,
                CaseStatus::Skipped => summary.skipped += 1,
            }
        }
        summary.total = cases.len();
        summary.cases = cases;
        summary
    }

    /// True only when every scheduled case ran and passed.
    pub fn success(&self) -> bool {
        self.passed == self.total
    }

    pub fn absorb(&mut self, other: &Summary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.duration += other.duration;
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// `depends: ~`, `depends: A` and `depends: [A, B]` are all accepted.
pub(crate) fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<OneOrMany> = Option::deserialize(deserializer)?;
    let names: Vec<String> = raw
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect();
    if names.iter().any(|s| s.is_empty()) {
        return Err(de::Error::custom("empty dependency name"));
    }
    Ok(names)
}
