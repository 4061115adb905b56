use crate::engine::{FailGate, RunOptions, execute_case, skipped};
use crate::error::Result;
use crate::t_args;
use crate::testset::TestSet;
use crate::types::{CaseResult, CaseStatus, RunContext, Summary};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Runs independent branches of the set concurrently, at most
/// `opts.effective_jobs()` cases at a time. A case starts only once all of its
/// dependencies have finished; among ready cases the one earliest in
/// execution order goes first. Results come back in execution order.
pub async fn run_set_async(set: &TestSet, ctx: &RunContext, opts: &RunOptions) -> Result<Summary> {
    let selection = set.select(&opts.targets)?;
    let jobs = opts.effective_jobs();
    let graph = set.graph();
    let ctx = Arc::new(ctx.clone());
    let clock = Instant::now();

    let mut gate = FailGate::new(set, opts);
    let mut done = vec![false; graph.len()];
    let mut started = vec![false; selection.len()];
    let mut results: Vec<Option<CaseResult>> = vec![None; selection.len()];
    let mut running = FuturesUnordered::new();

    loop {
        // Dependents always sit later in the order than their dependencies,
        // so a skip recorded here can unblock cases further along this pass.
        for (slot, &node) in selection.iter().enumerate() {
            if running.len() >= jobs {
                break;
            }
            if started[slot] || !graph.dependencies(node).iter().all(|&d| done[d]) {
                continue;
            }
            started[slot] = true;
            let sc = set.case(node);
            if let Some(reason) = gate.skip_reason(node) {
                let result = skipped(sc, reason);
                gate.record(node, &result);
                results[slot] = Some(result);
                done[node] = true;
                continue;
            }
            debug!("{}", t_args!("debug-spawn-case", "case" => &sc.spec.name, "running" => running.len() + 1));
            let sc = sc.clone();
            let ctx = Arc::clone(&ctx);
            let handle = tokio::task::spawn_blocking(move || execute_case(&sc, &ctx));
            running.push(async move { (slot, node, handle.await) });
        }

        let Some((slot, node, joined)) = running.next().await else {
            break;
        };
        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                let sc = set.case(node);
                CaseResult {
                    name: sc.spec.name.clone(),
                    module: sc.spec.module_key().to_string(),
                    status: CaseStatus::Failed,
                    message: Some(t_args!("case-join-failed", "error" => e)),
                    output: String::new(),
                    duration: Duration::ZERO,
                }
            }
        };
        gate.record(node, &result);
        results[slot] = Some(result);
        done[node] = true;
    }

    let results: Vec<CaseResult> = results.into_iter().flatten().collect();
    Ok(Summary::from_results(&set.name, results, clock.elapsed()))
}
