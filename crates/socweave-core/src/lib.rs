//! Socweave triage orchestration engine.
//!
//! The engine underneath the alert triage pipeline: a wave-parallel DAG
//! executor with typed state-merge semantics, the declarative policy rule
//! engine, the deterministic decision gate, the HITL outcome state machine,
//! and the checkpoint/replay manager. External collaborators (scoring,
//! search, case upload, notification) sit behind the [`collaborator`]
//! traits; persistence sits behind the [`repository`] trait.

pub mod collaborator;
pub mod decision;
pub mod engine;
pub mod policy;
pub mod repository;
