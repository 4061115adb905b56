use crate::error::Result;
use crate::testset::{ScheduledCase, TestSet};
use crate::types::{CaseResult, CaseStatus, RunContext, Summary};
use crate::{t, t_args};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the set's own `stop_on_fail` when given.
    pub stop_on_fail: Option<bool>,
    /// Maximum concurrently running cases; 0 means one per CPU.
    pub jobs: usize,
    /// Run only these cases and their prerequisites. Empty runs the whole set.
    pub targets: Vec<String>,
}

impl RunOptions {
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }
}

/// Tracks failures seen so far and decides whether a case still runs.
pub(crate) struct FailGate<'a> {
    set: &'a TestSet,
    stop_on_fail: bool,
    failed: Vec<usize>,
}

impl<'a> FailGate<'a> {
    pub(crate) fn new(set: &'a TestSet, opts: &RunOptions) -> Self {
        Self {
            set,
            stop_on_fail: opts.stop_on_fail.unwrap_or(set.stop_on_fail),
            failed: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, node: usize, result: &CaseResult) {
        if result.status == CaseStatus::Failed {
            self.failed.push(node);
        }
    }

    /// `Some(reason)` when the case must be skipped.
    pub(crate) fn skip_reason(&self, node: usize) -> Option<String> {
        let Some(&first) = self.failed.first() else {
            return None;
        };
        if !self.stop_on_fail || self.set.case(node).spec.always_execute {
            return None;
        }
        let graph = self.set.graph();
        match self
            .failed
            .iter()
            .find(|&&f| graph.depends_transitively(node, f))
        {
            Some(&dep) => Some(t_args!("skip-dependency-failed", "case" => graph.name(dep))),
            None => Some(t_args!("skip-stop-on-fail", "case" => graph.name(first))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        t!("case-panic-unknown")
    }
}

/// Runs one case, turning errors and panics from its body into a failed result.
pub fn execute_case(sc: &ScheduledCase, ctx: &RunContext) -> CaseResult {
    info!("{}", t_args!("info-running-case", "case" => &sc.spec.name));
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| sc.case.run(ctx)));
    let duration = started.elapsed();
    let (status, message, output) = match outcome {
        Ok(Ok(out)) if out.passed => (CaseStatus::Passed, out.message, out.output),
        Ok(Ok(out)) => (
            CaseStatus::Failed,
            Some(out.message.unwrap_or_else(|| t!("case-reported-failure"))),
            out.output,
        ),
        Ok(Err(e)) => (CaseStatus::Failed, Some(format!("{e:#}")), String::new()),
        Err(payload) => (
            CaseStatus::Failed,
            Some(t_args!("case-panicked", "reason" => panic_message(payload.as_ref()))),
            String::new(),
        ),
    };
    if status == CaseStatus::Failed {
        warn!(
            "{}",
            t_args!("warn-case-failed",
                "case" => &sc.spec.name,
                "reason" => message.as_deref().unwrap_or_default()
            )
        );
    }
    CaseResult {
        name: sc.spec.name.clone(),
        module: sc.spec.module_key().to_string(),
        status,
        message,
        output,
        duration,
    }
}

pub(crate) fn skipped(sc: &ScheduledCase, reason: String) -> CaseResult {
    info!("{}", t_args!("info-skipping-case", "case" => &sc.spec.name, "reason" => &reason));
    CaseResult {
        name: sc.spec.name.clone(),
        module: sc.spec.module_key().to_string(),
        status: CaseStatus::Skipped,
        message: Some(reason),
        output: String::new(),
        duration: Duration::ZERO,
    }
}

/// Runs the selected cases one at a time in execution order.
pub fn run_set(set: &TestSet, ctx: &RunContext, opts: &RunOptions) -> Result<Summary> {
    let selection = set.select(&opts.targets)?;
    let started = Instant::now();
    let mut gate = FailGate::new(set, opts);
    let mut results = Vec::with_capacity(selection.len());
    for node in selection {
        let sc = set.case(node);
        let result = match gate.skip_reason(node) {
            Some(reason) => skipped(sc, reason),
            None => execute_case(sc, ctx),
        };
        gate.record(node, &result);
        results.push(result);
    }
    Ok(Summary::from_results(&set.name, results, started.elapsed()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_jobs_means_one_per_cpu() {
        let opts = RunOptions {
            jobs: 0,
            ..Default::default()
        };
        assert_eq!(opts.effective_jobs(), num_cpus::get().max(1));
        assert!(opts.effective_jobs() >= 1);
        let opts = RunOptions {
            jobs: 3,
            ..Default::default()
        };
        assert_eq!(opts.effective_jobs(), 3);
    }
}
