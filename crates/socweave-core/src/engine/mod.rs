//! Engine core: DAG planning, state merge, step execution, and durable
//! checkpointing.
//!
//! - `dag` -- step graph builder, cycle detection, parallel wave computation
//! - `state` -- typed state deltas and the guarded merge contract
//! - `steps` -- the triage pipeline topology and step bodies
//! - `retry` -- attempt-count retry gate for failed steps
//! - `checkpoint` -- durable checkpoint manager with degraded-mode fallback
//! - `executor` -- wave-based parallel executor with resume and cancellation
//! - `hitl` -- human-in-the-loop outcome resolution and transitions

pub mod checkpoint;
pub mod dag;
pub mod executor;
pub mod hitl;
pub mod retry;
pub mod state;
pub mod steps;
