//! The `rwbench` command-line tool.
//!
//! This builds on top of [`rwbench_core`] and wires it up with layered configuration, logging and
//! a concrete object-store client.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod observability;
pub mod storage;
