//! Test utilities for the benchmark crates.
//!
//! This crate provides utilities to facilitate testing the benchmark against controlled object
//! stores. See the modules for all available utilities.

pub mod clients;
pub mod tracing;
