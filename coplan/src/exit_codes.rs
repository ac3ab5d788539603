//! Stable exit codes for coplan CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed: unknown domain, invalid config or solution file, or a
/// domain definition error raised during the search.
pub const INVALID: i32 = 1;
/// `coplan explore` found no goal (AND/OR root not DONE, or no final leaf
/// reaching the goal); `coplan rank` found no final leaf to rank.
pub const NO_SOLUTION: i32 = 2;
