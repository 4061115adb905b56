//! A whole `run` over several test sets: which sets take part, what each is
//! handed, and the exit status the outcome maps to.

use crate::engine::{RunOptions, run_set};
use crate::engine_async::run_set_async;
use crate::error::{Result, SuiteError};
use crate::registry::Registry;
use crate::spec::{SetSpec, load_specs};
use crate::testset::TestSet;
use crate::types::{RunContext, Summary};
use crate::{t, t_args};
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

pub const EXIT_FAILED: u8 = 1;
pub const EXIT_MALFORMED: u8 = 2;

/// Instantiates one parsed declaration through `registry`.
pub fn build_set(spec: &SetSpec, registry: &Registry) -> anyhow::Result<TestSet> {
    let set = TestSet::new(spec.name.clone(), spec.cases.clone(), registry, &spec.parameters)
        .with_context(|| t_args!("error-malformed-set", "file" => spec.file.display()))?;
    Ok(set.with_stop_on_fail(spec.stop_on_fail))
}

pub fn load_sets(paths: &[PathBuf], registry: &Registry) -> anyhow::Result<Vec<(SetSpec, TestSet)>> {
    load_specs(paths)?
        .into_iter()
        .map(|spec| {
            let set = build_set(&spec, registry)?;
            Ok((spec, set))
        })
        .collect()
}

/// Choices that apply to every set of a run, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Case names to run with their prerequisites. Empty runs everything.
    pub tests: Vec<String>,
    pub stop_on_fail: Option<bool>,
    pub jobs: usize,
    /// Each set logs under its own subdirectory.
    pub log_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub inventory: Option<PathBuf>,
}

/// A set that passed validation, with what it will run under.
#[derive(Debug)]
pub struct PreparedSet {
    pub set: TestSet,
    pub ctx: RunContext,
    pub opts: RunOptions,
}

impl RunRequest {
    fn context_for(&self, spec: &SetSpec) -> RunContext {
        RunContext {
            target: self.target.clone().or_else(|| spec.target.clone()),
            inventory: self.inventory.clone().or_else(|| spec.inventory.clone()),
            log_dir: self.log_dir.as_ref().map(|d| d.join(&spec.name)),
        }
    }

    /// Picks the sets this run covers and validates every case they will
    /// execute. Nothing has run when this returns an error.
    pub fn prepare(&self, sets: Vec<(SetSpec, TestSet)>) -> Result<Vec<PreparedSet>> {
        let mut matched = vec![false; self.tests.len()];
        let mut prepared = Vec::with_capacity(sets.len());
        for (spec, set) in sets {
            // Targets name cases of one set; sets without any of them are left out.
            let mut targets = Vec::new();
            for (i, test) in self.tests.iter().enumerate() {
                if set.graph().lookup(test).is_some() {
                    matched[i] = true;
                    targets.push(test.clone());
                }
            }
            if !self.tests.is_empty() && targets.is_empty() {
                continue;
            }
            let selection = set.select(&targets)?;
            set.validate_nodes(&selection)?;
            prepared.push(PreparedSet {
                ctx: self.context_for(&spec),
                opts: RunOptions {
                    stop_on_fail: self.stop_on_fail,
                    jobs: self.jobs,
                    targets,
                },
                set,
            });
        }
        if let Some(i) = matched.iter().position(|m| !m) {
            return Err(SuiteError::UnknownTarget(self.tests[i].clone()));
        }
        Ok(prepared)
    }
}

impl PreparedSet {
    pub async fn run(&self) -> Result<Summary> {
        let jobs = self.opts.effective_jobs();
        info!(
            "{}",
            t_args!("info-starting-set",
                "name" => &self.set.name,
                "count" => self.set.len(),
                "jobs" => jobs
            )
        );
        if jobs > 1 {
            run_set_async(&self.set, &self.ctx, &self.opts).await
        } else {
            run_set(&self.set, &self.ctx, &self.opts)
        }
    }
}

/// Totals over every set of a run.
pub fn aggregate(summaries: &[Summary]) -> Summary {
    let mut all = Summary {
        name: t!("report-all-sets"),
        ..Default::default()
    };
    for s in summaries {
        all.absorb(s);
    }
    all
}

/// 0 when every scheduled case passed, [`EXIT_FAILED`] otherwise.
pub fn exit_status(summaries: &[Summary]) -> u8 {
    if aggregate(summaries).success() { 0 } else { EXIT_FAILED }
}
