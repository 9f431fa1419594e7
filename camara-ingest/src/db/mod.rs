//! Row staging and lookup helpers, one module per entity
//!
//! Every function takes `&mut SqliteConnection` so it works equally inside
//! the orchestrator's transaction and against a bare pool connection in
//! tests. Nothing here commits; the orchestrator owns the unit of work.

pub mod expenses;
pub mod legislators;
pub mod parties;
pub mod sessions;
pub mod votes;
