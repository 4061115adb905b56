use crate::case::{CommandCase, NoopCase, TestCase};
use crate::types::TestCaseSpec;
use anyhow::Result;
use indexmap::IndexMap;
use std::sync::Arc;

pub type CaseFactory = Box<dyn Fn(&TestCaseSpec) -> Result<Arc<dyn TestCase>> + Send + Sync>;

/// Maps module names to constructors. Cases are bound by name at set
/// construction time, through explicit registration only.
#[derive(Default)]
pub struct Registry {
    factories: IndexMap<String, CaseFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `command` and `noop` cases.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register("command", |spec| Ok(Arc::new(CommandCase::from_spec(spec)?)));
        r.register("noop", |spec| Ok(Arc::new(NoopCase::from_spec(spec)?)));
        r
    }

    /// Registers a factory, replacing any previous one under the same name.
    pub fn register<F>(&mut self, module: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&TestCaseSpec) -> Result<Arc<dyn TestCase>> + Send + Sync + 'static,
    {
        self.factories.insert(module.into(), Box::new(factory));
        self
    }

    pub fn get(&self, module: &str) -> Option<&CaseFactory> {
        self.factories.get(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules()).finish()
    }
}
