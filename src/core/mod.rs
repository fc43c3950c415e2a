//! Core stack logic: types, validation, evaluation, orchestration, registry.

pub mod error;
pub mod evaluator;
pub mod eventlog;
pub mod namer;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod types;
