//! # Bootstrap Orchestrator
//!
//! The [`Bootstrap`] is the conductor of process startup. It owns the fixed list of
//! managed components and drives them through one sequence:
//!
//! 1. **ConfiguringTrust** - install the trust settings into the [`TrustRegistry`].
//! 2. Build the shared deployment context from the effective trust settings.
//! 3. **DeployingAll** - launch one deployment per [`ComponentSpec`], all at once.
//! 4. Join on every [`CompletionSignal`](crate::CompletionSignal). This is a barrier, not
//!    a race: one failure never short-circuits the wait for the others.
//! 5. **Running** if every component is up (the [`TrafficGate`] opens), otherwise
//!    **Failed**, which is terminal. Components that did deploy are stopped again so a
//!    failed process never serves.
//!
//! ```text
//! NotStarted -> ConfiguringTrust -> DeployingAll -> Running -> Stopped
//!                                               \-> Failed
//! ```

use crate::component::{ComponentSpec, Deployable};
use crate::deployer::{Deployer, Deployment, PendingDeployment};
use crate::error::{BootstrapError, DeployError};
use crate::gate::TrafficGate;
use crate::signal::{CompletionSignal, SignalState};
use crate::trust::{TrustRegistry, TrustSettings};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Observable lifecycle of a [`Bootstrap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    NotStarted,
    ConfiguringTrust,
    DeployingAll,
    Running,
    Failed,
    Stopped,
}

/// Orchestrates the startup of a fixed set of components.
///
/// # Example
///
/// ```rust,ignore
/// let bootstrap = Bootstrap::new(specs)
///     .with_trust(TrustSettings::from_env(), TrustRegistry::global());
///
/// match bootstrap.start(|trust, gate| ServiceContext::new(config, trust, gate)).await {
///     Ok(system) => { /* serving */ }
///     Err(e) => { /* must not serve */ }
/// }
/// ```
pub struct Bootstrap<D: Deployable> {
    specs: Vec<ComponentSpec<D>>,
    trust: TrustSettings,
    registry: Arc<TrustRegistry>,
    startup_timeout: Option<Duration>,
    state: watch::Sender<BootstrapState>,
}

impl<D: Deployable> Bootstrap<D> {
    /// Creates an orchestrator for `specs`, installing default trust settings into the
    /// process-wide registry.
    pub fn new(specs: Vec<ComponentSpec<D>>) -> Self {
        let (state, _) = watch::channel(BootstrapState::NotStarted);
        Self {
            specs,
            trust: TrustSettings::default(),
            registry: TrustRegistry::global(),
            startup_timeout: None,
            state,
        }
    }

    /// Sets the trust settings to apply and the registry to apply them to.
    pub fn with_trust(mut self, trust: TrustSettings, registry: Arc<TrustRegistry>) -> Self {
        self.trust = trust;
        self.registry = registry;
        self
    }

    /// Bounds the join on all completion signals. Unbounded when `None` (the default).
    pub fn with_startup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn specs(&self) -> &[ComponentSpec<D>] {
        &self.specs
    }

    /// Subscribes to state transitions.
    pub fn state(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    fn transition(&self, next: BootstrapState) {
        info!(state = ?next, "Bootstrap state");
        self.state.send_replace(next);
    }

    /// Runs the bootstrap sequence to completion.
    ///
    /// `build_context` receives the effective trust settings and the (closed) traffic gate
    /// and produces the context handed to every component instance. It runs after trust
    /// configuration and before any deployment starts.
    pub async fn start<F>(self, build_context: F) -> Result<RunningSystem<D>, BootstrapError>
    where
        F: FnOnce(TrustSettings, TrafficGate) -> D::Context,
    {
        info!(components = self.specs.len(), "Bootstrap starting");

        // =====================================================================
        // 1. Trust configuration (happens-before every deployment)
        // =====================================================================

        self.transition(BootstrapState::ConfiguringTrust);
        let trust = self.registry.install(&self.trust);

        let gate = TrafficGate::new();
        let context = Arc::new(build_context(trust, gate.clone()));

        // =====================================================================
        // 2. Launch every deployment at once
        // =====================================================================

        self.transition(BootstrapState::DeployingAll);
        let deployer = Deployer::new(Arc::clone(&context));
        let pending: Vec<PendingDeployment<D>> = self
            .specs
            .iter()
            .map(|spec| {
                info!(
                    component = spec.name(),
                    instances = spec.instances(),
                    "Deploying component"
                );
                deployer.deploy(spec)
            })
            .collect();
        let signals: Vec<CompletionSignal> = pending.iter().map(|p| p.signal().clone()).collect();

        // =====================================================================
        // 3. Join on all signals
        // =====================================================================

        let joined = join_all(signals.iter().map(|signal| signal.wait()));
        let results = match self.startup_timeout {
            None => joined.await,
            Some(after) => match tokio::time::timeout(after, joined).await {
                Ok(results) => results,
                Err(_) => return Err(self.abandon(pending, after).await),
            },
        };

        // =====================================================================
        // 4. Aggregate
        // =====================================================================

        let failures: Vec<Arc<DeployError>> = results.into_iter().filter_map(Result::err).collect();

        let mut deployments = Vec::with_capacity(pending.len());
        for deployment in pending {
            if let Ok(deployment) = deployment.finish().await {
                deployments.push(deployment);
            }
        }

        if failures.is_empty() {
            gate.open();
            self.transition(BootstrapState::Running);
            info!(components = deployments.len(), "Bootstrap complete");
            return Ok(RunningSystem {
                deployments,
                context,
                gate,
                state: self.state,
            });
        }

        for failure in &failures {
            error!(component = failure.component(), error = %failure, "Component failed to deploy");
        }
        let succeeded = deployments.iter().map(Deployment::component).collect();
        undeploy_all(deployments).await;
        self.transition(BootstrapState::Failed);

        Err(BootstrapError::DeploymentFailed {
            failures,
            succeeded,
        })
    }

    /// Gives up on a join that overran the startup timeout.
    ///
    /// Every deployment is cancelled and awaited, so instances that were ready are stopped
    /// by their deployment and components that finished in the meantime are undeployed.
    async fn abandon(&self, pending: Vec<PendingDeployment<D>>, after: Duration) -> BootstrapError {
        let mut still_pending = Vec::new();
        let mut deployed = Vec::new();

        for deployment in &pending {
            deployment.request_cancel();
        }
        for deployment in pending {
            let component = deployment.component();
            let signal = deployment.signal().clone();
            match deployment.cancel().await {
                Some(deployment) => deployed.push(deployment),
                None if was_cancelled(&signal.state()) => still_pending.push(component),
                None => {}
            }
        }

        error!(?after, pending = ?still_pending, "Startup timed out");
        undeploy_all(deployed).await;
        self.transition(BootstrapState::Failed);

        BootstrapError::StartupTimedOut {
            after,
            pending: still_pending,
        }
    }
}

fn was_cancelled(state: &SignalState) -> bool {
    match state {
        SignalState::Failed(cause) => matches!(cause.as_ref(), DeployError::Abandoned { .. }),
        _ => false,
    }
}

/// Stops deployments in reverse order, logging failures.
async fn undeploy_all<D: Deployable>(deployments: Vec<Deployment<D>>) -> Option<DeployError> {
    let mut first_failure = None;
    for deployment in deployments.into_iter().rev() {
        if let Err(e) = deployment.undeploy().await {
            warn!(component = e.component(), error = %e, "Undeploy failed");
            first_failure.get_or_insert(e);
        }
    }
    first_failure
}

/// A fully started system. The traffic gate is open while this value is alive.
pub struct RunningSystem<D: Deployable> {
    deployments: Vec<Deployment<D>>,
    context: Arc<D::Context>,
    gate: TrafficGate,
    state: watch::Sender<BootstrapState>,
}

impl<D: Deployable> RunningSystem<D> {
    pub fn deployments(&self) -> &[Deployment<D>] {
        &self.deployments
    }

    pub fn deployment(&self, component: &str) -> Option<&Deployment<D>> {
        self.deployments.iter().find(|d| d.component() == component)
    }

    pub fn context(&self) -> &Arc<D::Context> {
        &self.context
    }

    pub fn gate(&self) -> &TrafficGate {
        &self.gate
    }

    pub fn state(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// Gracefully shuts down the system.
    ///
    /// Closes the traffic gate, then stops every component in reverse deployment order.
    /// Every component is stopped even if an earlier one fails; the first failure is
    /// returned.
    pub async fn shutdown(self) -> Result<(), DeployError> {
        info!("Shutting down system...");
        self.gate.close();

        let result = match undeploy_all(self.deployments).await {
            Some(err) => Err(err),
            None => Ok(()),
        };

        self.state.send_replace(BootstrapState::Stopped);
        info!("System shutdown complete.");
        result
    }
}
