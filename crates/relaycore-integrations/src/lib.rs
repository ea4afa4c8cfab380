//! # RelayCore Integrations
//!
//! Adapters to everything outside the core: the outbound NeuroWeaver
//! client, the HTTP upstream-provider caller, and the HTTP implementations
//! of the embedding and distributed-KV trait boundaries other crates
//! define.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod embedding;
pub mod kv;
pub mod neuroweaver;
pub mod provider;

pub use embedding::HttpEmbeddingProvider;
pub use kv::HttpDistributedKv;
pub use neuroweaver::{ModelHealth, ModelSwitchRequest, ModelThresholds, NeuroWeaverClient, PerformanceFeedback, SwitchType};
pub use provider::{HttpProviderCaller, ProviderCall, ProviderEndpoint};
