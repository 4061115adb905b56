//! Dependency graph over the cases of one test set.
//!
//! Nodes are indices into the declaration list; edges keep the declared order
//! of each case's `depends`, which is what makes resolution deterministic.

use crate::error::{Result, SuiteError};
use crate::types::TestCaseSpec;
use indexmap::IndexMap;

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: IndexMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

/// Accumulator threaded through [`DependencyGraph::resolve`].
///
/// `order` is the resolved list; `stack` holds the nodes currently being
/// resolved and is what detects cycles.
#[derive(Debug, Clone)]
pub struct Resolution {
    order: Vec<usize>,
    placed: Vec<bool>,
    stack: Vec<usize>,
    on_stack: Vec<bool>,
}

impl Resolution {
    pub fn new(graph: &DependencyGraph) -> Self {
        let n = graph.len();
        Self {
            order: Vec::with_capacity(n),
            placed: vec![false; n],
            stack: Vec::new(),
            on_stack: vec![false; n],
        }
    }

    /// Marks a node as placed without resolving its dependencies.
    /// Only valid for nodes whose dependencies are all placed already.
    pub fn place(&mut self, node: usize) {
        if !self.placed[node] {
            self.placed[node] = true;
            self.order.push(node);
        }
    }

    pub fn contains(&self, node: usize) -> bool {
        self.placed[node]
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn into_order(self) -> Vec<usize> {
        self.order
    }
}

/// Case names are identifiers and also name log files, so they must be
/// non-blank and free of path separators.
pub fn check_case_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) {
        return Err(SuiteError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl DependencyGraph {
    pub fn build(specs: &[TestCaseSpec]) -> Result<Self> {
        let mut index = IndexMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            check_case_name(&spec.name)?;
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(SuiteError::DuplicateCase(spec.name.clone()));
            }
        }
        let mut edges = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut deps = Vec::with_capacity(spec.depends.len());
            for dep in &spec.depends {
                let idx = index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| SuiteError::MissingDependency {
                        case: spec.name.clone(),
                        missing: dep.clone(),
                    })?;
                deps.push(idx);
            }
            edges.push(deps);
        }
        Ok(Self {
            names: specs.iter().map(|s| s.name.clone()).collect(),
            index,
            edges,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, node: usize) -> &str {
        &self.names[node]
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.edges[node]
    }

    /// Resolves `target` and everything it depends on into `acc`, depth first,
    /// visiting dependencies in declared order. Nodes already in `acc` are
    /// left alone, so resolving the same target twice is a no-op.
    pub fn resolve(&self, target: usize, acc: &mut Resolution) -> Result<()> {
        if acc.placed[target] {
            return Ok(());
        }
        // Each frame is a node being resolved and the next edge to visit.
        let mut frames = vec![(target, 0usize)];
        acc.stack.push(target);
        acc.on_stack[target] = true;
        while let Some(frame) = frames.last_mut() {
            let node = frame.0;
            match self.edges[node].get(frame.1) {
                Some(&dep) => {
                    frame.1 += 1;
                    if acc.placed[dep] {
                        continue;
                    }
                    if acc.on_stack[dep] {
                        return Err(self.cycle_error(&acc.stack, dep));
                    }
                    acc.stack.push(dep);
                    acc.on_stack[dep] = true;
                    frames.push((dep, 0));
                }
                None => {
                    frames.pop();
                    acc.stack.pop();
                    acc.on_stack[node] = false;
                    acc.place(node);
                }
            }
        }
        Ok(())
    }

    pub fn resolve_name(&self, target: &str, acc: &mut Resolution) -> Result<()> {
        let node = self
            .lookup(target)
            .ok_or_else(|| SuiteError::UnknownTarget(target.to_string()))?;
        self.resolve(node, acc)
    }

    /// Nodes needed to run `targets`: the targets plus all transitive
    /// prerequisites. Indexed by node.
    pub fn closure<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<bool>> {
        let mut acc = Resolution::new(self);
        for t in targets {
            self.resolve_name(t.as_ref(), &mut acc)?;
        }
        Ok(acc.placed)
    }

    /// True when `ancestor` is reachable from `node` through `depends` edges.
    pub fn depends_transitively(&self, node: usize, ancestor: usize) -> bool {
        let mut seen = vec![false; self.len()];
        let mut todo = self.edges[node].clone();
        while let Some(n) = todo.pop() {
            if n == ancestor {
                return true;
            }
            if !seen[n] {
                seen[n] = true;
                todo.extend_from_slice(&self.edges[n]);
            }
        }
        false
    }

    fn cycle_error(&self, stack: &[usize], repeated: usize) -> SuiteError {
        let start = stack.iter().position(|&n| n == repeated).unwrap_or(0);
        let cycle = stack[start..]
            .iter()
            .chain(std::iter::once(&repeated))
            .map(|&n| self.names[n].clone())
            .collect();
        SuiteError::CyclicDependency { cycle }
    }
}
