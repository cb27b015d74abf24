//! Infrastructure implementations for Socweave.
//!
//! Concrete backends for the core's trait seams: SQLite run persistence,
//! HTTP collaborator clients (scoring, search, case manager, notification),
//! engine configuration loading, and the JSONL audit trail.

pub mod audit;
pub mod config;
pub mod http;
pub mod live;
pub mod sqlite;
