//! # RelayCore Pipeline
//!
//! Assembles the other nine crates into the single `process(request)`
//! operation that is the system's reason for existing: steering picks a
//! route, budgets gate it, cost prediction sizes it, the semantic cache
//! short-circuits it, and the priority queue/circuit breaker/failover
//! chain actually dispatches it. Also owns the background workers those
//! subsystems depend on (the queue poller, the distributed-cache sweeper)
//! and the cooperative-cancellation primitive threaded through every
//! stage.
//!
//! This crate intentionally knows nothing about transport (no HTTP
//! server) — it is the library a binary wires up, not the binary itself.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cancellation;
pub mod executor;
pub mod request_pipeline;
pub mod types;
pub mod workers;

pub use cancellation::CancellationToken;
pub use executor::{QueuedCall, ResilientExecutor};
pub use request_pipeline::RequestPipeline;
pub use types::{priority_for, PipelineResponse};
pub use workers::PipelineWorkers;
