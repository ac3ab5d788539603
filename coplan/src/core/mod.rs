//! Deterministic, pure planning logic.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! worlds and trees and return deterministic outputs suitable for tests.

pub mod agents;
pub mod andor;
pub mod apply;
pub mod domain;
pub mod error;
pub mod expand;
pub mod frontier;
pub mod invariants;
pub mod metrics;
pub mod parallel;
pub mod refine;
pub mod state;
pub mod task;
pub mod tree;
pub mod types;
pub mod worlds;
