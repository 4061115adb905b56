use thiserror::Error;

/// Structural problems with a test-set declaration. All of these are raised
/// before any case runs.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("Test case `{case}` depends on `{missing}`, which is not declared in this set")]
    MissingDependency { case: String, missing: String },
    #[error("Test case name `{0}` is blank or contains a path separator")]
    InvalidName(String),
    #[error("Test case `{0}` is declared more than once")]
    DuplicateCase(String),
    #[error("No test case named `{0}` in this set")]
    UnknownTarget(String),
    #[error("Test case `{case}` refers to module `{module}`, which is not registered")]
    UnknownModule { case: String, module: String },
    #[error("Could not instantiate test case `{case}`: {source}")]
    Instantiate {
        case: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Test case `{case}` is misconfigured: {source}")]
    Validation {
        case: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = SuiteError> = std::result::Result<T, E>;
