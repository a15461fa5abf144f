//! # Service Lifecycle
//!
//! Wires the tracking-service components into the deploy framework. The
//! [`TrackingSystem`] declares which components exist and at what concurrency, then
//! hands them to the [`Bootstrap`](deploy_framework::Bootstrap) orchestrator:
//!
//! ```rust,ignore
//! let config = ServiceConfig::from_env()?;
//! let system = TrackingSystem::start(config).await?;   // every component is up
//! // ... serve ...
//! system.shutdown().await?;
//! ```
//!
//! A failed start returns the [`BootstrapError`](deploy_framework::BootstrapError) and
//! leaves nothing running. The binary logs it and exits non-zero.

pub mod tracking_system;

pub use tracking_system::*;
