//! HTTP clients for the external collaborators.

pub mod case;
pub mod notify;
pub mod scoring;
pub mod search;
