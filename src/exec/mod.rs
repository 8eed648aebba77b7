// src/exec/mod.rs

//! Action execution layer.
//!
//! The repository runtime talks to an [`ActionBackend`] instead of running
//! the pipeline itself. Production uses [`PipelineBackend`], which runs the
//! blocking pipeline on tokio's blocking pool behind a bounded worker
//! semaphore; tests can substitute a backend that runs inline.

pub mod backend;

pub use backend::{ActionBackend, ActionFuture, PipelineBackend, StageSink};
