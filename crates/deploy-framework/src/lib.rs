//! # Deploy Framework
//!
//! This crate provides the building blocks for supervising the startup of a process made
//! of several independently deployable components. It answers one question: *is every
//! component up?* The process may serve traffic only when the answer is yes.
//!
//! ## Architecture Overview
//!
//! The framework separates concerns into three layers:
//!
//! 1. **Component Layer** ([`Deployable`]) - Your initialization logic, opaque to the framework
//! 2. **Deployment Layer** ([`Deployer`]) - Runs N instances of one component and resolves
//!    one [`CompletionSignal`]
//! 3. **Orchestration Layer** ([`Bootstrap`]) - Applies trust configuration, deploys every
//!    component concurrently and aggregates the signals into one outcome
//!
//! ## Core Abstractions
//!
//! ```rust
//! use deploy_framework::{Bootstrap, ComponentSpec, Deployable, TrustRegistry, TrustSettings};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! // 1. Define the component
//! struct Worker;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("worker failed")]
//! struct WorkerError;
//!
//! #[async_trait]
//! impl Deployable for Worker {
//!     type Context = TrustSettings;
//!     type Error = WorkerError;
//!
//!     async fn start(&mut self, _trust: &TrustSettings) -> Result<(), WorkerError> {
//!         Ok(())
//!     }
//! }
//!
//! // 2. Describe and start the system
//! #[tokio::main]
//! async fn main() {
//!     let specs = vec![ComponentSpec::new("worker", 3, |_: &TrustSettings| Worker)];
//!     let bootstrap = Bootstrap::new(specs)
//!         .with_trust(TrustSettings::default(), Arc::new(TrustRegistry::new()));
//!
//!     let system = bootstrap.start(|trust, _gate| trust).await.unwrap();
//!     assert_eq!(system.deployments()[0].len(), 3);
//!     system.shutdown().await.unwrap();
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Every instance of every component initializes in its own Tokio task
//! - Each component has exactly one [`CompletionSignal`], written once and read many times
//! - The orchestrator waits for **all** signals; a failure never cancels siblings
//! - Trust configuration is installed before the first deployment starts and is passed
//!   into every instance's context
//!
//! ## Testing
//!
//! The [`mock`] module provides [`MockComponent`](mock::MockComponent), a scriptable
//! component for exercising the supervision protocol without real I/O.

pub mod bootstrap;
pub mod component;
pub mod deployer;
pub mod error;
pub mod gate;
pub mod mock;
pub mod signal;
pub mod tracing;
pub mod trust;

// Re-export core types for convenience
pub use bootstrap::{Bootstrap, BootstrapState, RunningSystem};
pub use component::{ComponentSpec, Deployable, Factory};
pub use deployer::{Deployer, Deployment, PendingDeployment};
pub use error::{BootstrapError, DeployError};
pub use gate::TrafficGate;
pub use signal::{completion_signal, CompletionSignal, SignalResolver, SignalState};
pub use trust::{TrustRegistry, TrustSettings};
