//! # Observability & Tracing
//!
//! This module provides the tracing setup shared by every binary built on the framework.
//!
//! The [`setup_tracing`] function initializes structured logging with the `tracing` crate.
//! The compact format hides the crate/module prefix (`with_target(false)`); the structured
//! `component` and `instance` fields carry that context instead.
//!
//! ## What Gets Traced
//!
//! - **Trust configuration**: each installed location, or that it was not set
//! - **Bootstrap transitions**: `ConfiguringTrust`, `DeployingAll`, `Running`, `Failed`
//! - **Deployments**: per component start, per instance readiness and failure
//! - **Shutdown**: undeploy of every component
//!
//! ## Usage Examples
//!
//! ```bash
//! # Compact logs (default)
//! RUST_LOG=info cargo run
//!
//! # Per-instance readiness
//! RUST_LOG=debug cargo run
//!
//! # Filter to the framework only
//! RUST_LOG=deploy_framework=debug cargo run
//! ```
//!
//! **With `RUST_LOG=info`** a successful startup reads:
//!
//! ```text
//! INFO Setting trust store path=/etc/pki/store
//! INFO Trust anchors not set
//! INFO Bootstrap state state=DeployingAll
//! INFO Deploying component component="redis" instances=1
//! INFO Deployed component="redis" instances=1
//! INFO Bootstrap complete components=4
//! ```

/// Initializes the global tracing subscriber, filtered by `RUST_LOG`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
