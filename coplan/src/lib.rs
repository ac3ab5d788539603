//! Concurrent human-robot task planning over hierarchical task networks.
//!
//! Both agents refine their own agendas; the planner builds the tree of joint
//! action pairs they may execute, tracks the worlds the human can't tell
//! apart, and ranks the resulting branches. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (refinement, expansion, search,
//!   metrics). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config and solution files).
//!
//! Orchestration modules ([`explore`], [`rank`]) coordinate core logic with
//! I/O to implement CLI commands. Built-in demo domains live in [`domains`].

pub mod core;
pub mod domains;
pub mod exit_codes;
pub mod explore;
pub mod io;
pub mod logging;
pub mod rank;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
