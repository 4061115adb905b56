#![allow(dead_code)]

use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use testset::case::TestCase;
use testset::registry::Registry;
use testset::types::{CaseOutput, RunContext, TestCaseSpec};

#[derive(Clone, Copy, Debug)]
pub enum Behaviour {
    Pass,
    Fail,
    Error,
    Panic,
}

/// Records start and finish of every case, in the order they happen.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Names of the cases that finished, in completion order.
    pub fn ran(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("end:").map(str::to_string))
            .collect()
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("no event {event}"))
    }
}

pub struct ScriptedCase {
    name: String,
    behaviour: Behaviour,
    delay: Duration,
    invalid: bool,
    journal: Journal,
}

impl TestCase for ScriptedCase {
    fn run(&self, _ctx: &RunContext) -> Result<CaseOutput> {
        self.journal.push(format!("start:{}", self.name));
        thread::sleep(self.delay);
        self.journal.push(format!("end:{}", self.name));
        match self.behaviour {
            Behaviour::Pass => Ok(CaseOutput::pass().with_output(format!("{} ok", self.name))),
            Behaviour::Fail => Ok(CaseOutput::fail(format!("{} did not hold", self.name))),
            Behaviour::Error => Err(anyhow!("connection refused by {}", self.name)),
            Behaviour::Panic => panic!("{} blew up", self.name),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.invalid {
            return Err(anyhow!("{} is misconfigured", self.name));
        }
        Ok(())
    }
}

/// Registry with a `scripted` module. Its behaviour comes from the
/// `behaviour` parameter (`pass`, `fail`, `error`, `panic`) and it sleeps
/// for `delay_ms` before finishing. `invalid: true` makes validation fail.
pub fn scripted_registry(journal: &Journal) -> Registry {
    let mut registry = Registry::with_builtins();
    let journal = journal.clone();
    registry.register("scripted", move |spec: &TestCaseSpec| {
        let behaviour = match spec.parameters.get("behaviour").and_then(|v| v.as_str()) {
            None | Some("pass") => Behaviour::Pass,
            Some("fail") => Behaviour::Fail,
            Some("error") => Behaviour::Error,
            Some("panic") => Behaviour::Panic,
            Some(other) => return Err(anyhow!("unknown behaviour {other}")),
        };
        let delay = spec
            .parameters
            .get("delay_ms")
            .and_then(|v| v.as_u64())
            .map(Duration::from_millis)
            .unwrap_or_default();
        let case: Arc<dyn TestCase> = Arc::new(ScriptedCase {
            name: spec.name.clone(),
            behaviour,
            delay,
            invalid: spec.parameters.get("invalid").and_then(|v| v.as_bool()).unwrap_or(false),
            journal: journal.clone(),
        });
        Ok(case)
    });
    registry
}

pub fn case(name: &str, depends: &[&str]) -> TestCaseSpec {
    TestCaseSpec::new(name)
        .module("scripted")
        .depends_on(depends.iter().copied())
}

pub fn failing(name: &str, depends: &[&str]) -> TestCaseSpec {
    case(name, depends).param("behaviour", "fail")
}
