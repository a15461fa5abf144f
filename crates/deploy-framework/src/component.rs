//! # Deployable Trait
//!
//! The `Deployable` trait defines the contract that every managed component (backing-store
//! connector, cache, HTTP front end, stream connector, …) must implement so the generic
//! [`Deployer`](crate::Deployer) can run it. A component only exposes two lifecycle hooks:
//! `start`, which performs its initialization and reports readiness, and `stop`, which
//! releases whatever `start` acquired. Everything else about a component (wire protocol,
//! storage format, routing) stays private to it.
//!
//! # Architecture Note
//! By defining one contract that all components satisfy, the deployment and supervision
//! logic is written *once* and works for every component type.
//!
//! # Provided Methods (Hooks)
//! - [`Deployable::stop`] defaults to doing nothing (`Ok(())`).

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Trait that any component must implement to be deployed by the [`Deployer`](crate::Deployer).
///
/// # Async & Context
/// This trait is `#[async_trait]` so initialization can perform I/O (connecting to a backing
/// store, binding a socket). The `Context` type is injected into every hook. It is built
/// by the orchestrator *after* trust configuration has been applied, so components receive
/// the effective trust settings explicitly instead of reading ambient process state.
#[async_trait]
pub trait Deployable: Send + 'static {
    /// The runtime context (shared configuration and dependencies) handed to every instance.
    /// Use `()` if no dependencies are needed.
    type Context: Send + Sync + 'static;

    /// The error type reported when an instance fails to initialize or stop.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Initializes this instance. Returning `Ok(())` reports readiness.
    async fn start(&mut self, ctx: &Self::Context) -> Result<(), Self::Error>;

    /// Releases resources acquired by [`Deployable::start`].
    ///
    /// Called on shutdown and when a sibling instance of the same component failed.
    async fn stop(&mut self, _ctx: &Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Capability that produces one fresh instance of a component on demand.
pub type Factory<D> = Arc<dyn Fn(&<D as Deployable>::Context) -> D + Send + Sync>;

/// Immutable description of one managed component: its name, how to build an instance,
/// and how many instances to run.
pub struct ComponentSpec<D: Deployable> {
    name: &'static str,
    factory: Factory<D>,
    instances: usize,
}

impl<D: Deployable> ComponentSpec<D> {
    /// Creates a spec for `instances` concurrent instances built by `factory`.
    pub fn new(
        name: &'static str,
        instances: usize,
        factory: impl Fn(&D::Context) -> D + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            factory: Arc::new(factory),
            instances,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn factory(&self) -> Factory<D> {
        Arc::clone(&self.factory)
    }
}

impl<D: Deployable> Clone for ComponentSpec<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            factory: Arc::clone(&self.factory),
            instances: self.instances,
        }
    }
}

impl<D: Deployable> fmt::Debug for ComponentSpec<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("name", &self.name)
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}
