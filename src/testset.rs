use crate::case::TestCase;
use crate::error::{Result, SuiteError};
use crate::graph::{DependencyGraph, Resolution};
use crate::registry::Registry;
use crate::t_args;
use crate::types::{Parameters, TestCaseSpec};
use std::sync::Arc;
use tracing::{debug, info};

/// One case of a set, instantiated and ready to run.
#[derive(Clone)]
pub struct ScheduledCase {
    pub spec: TestCaseSpec,
    pub case: Arc<dyn TestCase>,
}

/// A named, ordered collection of test cases for one feature area.
pub struct TestSet {
    pub name: String,
    pub stop_on_fail: bool,
    graph: DependencyGraph,
    cases: Vec<ScheduledCase>,
    order: Vec<usize>,
}

/// Builds the execution order: dependency-free cases first in declaration
/// order, then every remaining case preceded by whatever it still needs.
pub fn execution_order(graph: &DependencyGraph) -> Result<Vec<usize>> {
    let mut acc = Resolution::new(graph);
    for node in 0..graph.len() {
        if graph.dependencies(node).is_empty() {
            acc.place(node);
        }
    }
    for node in 0..graph.len() {
        if !acc.contains(node) {
            graph.resolve(node, &mut acc)?;
        }
    }
    Ok(acc.into_order())
}

impl TestSet {
    /// `shared` parameters are merged under each case's own parameters
    /// before its factory is called.
    pub fn new(
        name: impl Into<String>,
        specs: Vec<TestCaseSpec>,
        registry: &Registry,
        shared: &Parameters,
    ) -> Result<Self> {
        let name = name.into();
        let graph = DependencyGraph::build(&specs)?;
        let order = execution_order(&graph)?;

        let mut slots: Vec<Option<ScheduledCase>> = vec![None; specs.len()];
        for &node in &order {
            let mut spec = specs[node].clone();
            for (k, v) in shared {
                if !spec.parameters.contains_key(k) {
                    spec.parameters.insert(k.clone(), v.clone());
                }
            }
            let module = spec.module_key().to_string();
            let factory = registry.get(&module).ok_or_else(|| SuiteError::UnknownModule {
                case: spec.name.clone(),
                module: module.clone(),
            })?;
            let case = factory(&spec).map_err(|source| SuiteError::Instantiate {
                case: spec.name.clone(),
                source,
            })?;
            info!("{}", t_args!("info-adding-case", "case" => &spec.name, "module" => &module));
            slots[node] = Some(ScheduledCase { spec, case });
        }
        // Every node appears in `order` exactly once, so every slot is filled.
        let cases = slots.into_iter().flatten().collect();
        debug!("{}", t_args!("debug-order", "set" => &name, "count" => order.len()));

        Ok(Self {
            name,
            stop_on_fail: false,
            graph,
            cases,
            order,
        })
    }

    pub fn with_stop_on_fail(mut self, stop_on_fail: bool) -> Self {
        self.stop_on_fail = stop_on_fail;
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn case(&self, node: usize) -> &ScheduledCase {
        &self.cases[node]
    }

    /// Full execution order as node indices.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn order_names(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.graph.name(n)).collect()
    }

    /// The execution order restricted to `targets` and their prerequisites.
    /// An empty target list selects everything.
    pub fn select<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<usize>> {
        if targets.is_empty() {
            return Ok(self.order.clone());
        }
        let needed = self.graph.closure(targets)?;
        Ok(self.order.iter().copied().filter(|&n| needed[n]).collect())
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_nodes(&self.order)
    }

    /// Validates only `nodes`, typically a [`TestSet::select`] result.
    pub fn validate_nodes(&self, nodes: &[usize]) -> Result<()> {
        for &node in nodes {
            let sc = &self.cases[node];
            sc.case.validate().map_err(|source| SuiteError::Validation {
                case: sc.spec.name.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TestSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSet")
            .field("name", &self.name)
            .field("stop_on_fail", &self.stop_on_fail)
            .field("order", &self.order_names())
            .finish()
    }
}
