pub mod case;
pub mod engine;
pub mod engine_async;
pub mod error;
pub mod graph;
pub mod i18n;
pub mod junit;
pub mod registry;
pub mod report;
pub mod session;
pub mod spec;
pub mod testset;
pub mod types;

// Re-export the localization macros
pub use crate::i18n::{t, t_with_args};
