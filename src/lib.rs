//! stackwright: declarative stack orchestration.
//!
//! JSON templates declare parameters, mappings, and resources. Intrinsic
//! functions are evaluated against per-stack context, security groups are
//! created synchronously, instances are launched and then polled until
//! running or until a caller-supplied timeout expires. Every stack keeps an
//! event history and a list of realized resources.

pub mod cli;
pub mod core;
pub mod provider;
