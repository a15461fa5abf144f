//! # Component Deployer
//!
//! This module defines the [`Deployer`], which turns one [`ComponentSpec`] into running
//! instances. It implements the per-component half of the supervision protocol: start
//! every instance concurrently, wait for all of them, and resolve exactly one
//! [`CompletionSignal`] for the component.
//!
//! A component is atomically "up" or "down" from the outside. If any instance fails, the
//! instances that did become ready are stopped again *before* the signal resolves as
//! failed, so no partially deployed component is ever observable. The same holds when a
//! deployment is cancelled through [`PendingDeployment::cancel`].

use crate::component::{ComponentSpec, Deployable};
use crate::error::DeployError;
use crate::signal::{completion_signal, CompletionSignal, SignalResolver};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Deploys components of type `D`, handing every instance the shared context.
///
/// # Concurrency Model
/// Each call to [`Deployer::deploy`] spawns one supervising task, which in turn spawns one
/// task per instance. Instances of a component initialize in parallel, and different
/// components deploy in parallel with each other. Nothing is cancelled when an instance
/// fails; the failure only decides how the signal resolves.
pub struct Deployer<D: Deployable> {
    context: Arc<D::Context>,
}

impl<D: Deployable> Clone for Deployer<D> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
        }
    }
}

impl<D: Deployable> Deployer<D> {
    pub fn new(context: Arc<D::Context>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<D::Context> {
        &self.context
    }

    /// Starts deploying `spec` and returns immediately.
    ///
    /// The returned [`PendingDeployment`] exposes the component's [`CompletionSignal`]
    /// right away; [`PendingDeployment::finish`] yields the running instances.
    pub fn deploy(&self, spec: &ComponentSpec<D>) -> PendingDeployment<D> {
        let (resolver, signal) = completion_signal(spec.name());
        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run_deployment(
            spec.clone(),
            Arc::clone(&self.context),
            resolver,
            cancelled,
        ));
        PendingDeployment {
            component: spec.name(),
            signal,
            cancel,
            task,
        }
    }
}

/// Supervises the instances of one component until its signal resolves.
async fn run_deployment<D: Deployable>(
    spec: ComponentSpec<D>,
    context: Arc<D::Context>,
    resolver: SignalResolver,
    mut cancel: watch::Receiver<bool>,
) -> Option<Deployment<D>> {
    let component = spec.name();
    let count = spec.instances();

    if count == 0 {
        let err = DeployError::InvalidInstanceCount { component };
        error!(component, error = %err, "Deployment failed");
        resolver.resolve(Err(err));
        return None;
    }

    info!(component, instances = count, "Deploying");

    let mut starting = JoinSet::new();
    let mut task_instances = HashMap::with_capacity(count);
    for instance in 0..count {
        let factory = spec.factory();
        let context = Arc::clone(&context);
        let handle = starting.spawn(async move {
            let mut item = factory(&context);
            let result = item.start(&context).await;
            (instance, item, result)
        });
        task_instances.insert(handle.id(), instance);
    }

    let mut ready: Vec<(usize, D)> = Vec::with_capacity(count);
    let mut first_failure: Option<DeployError> = None;

    loop {
        let joined = tokio::select! {
            joined = starting.join_next_with_id() => joined,
            () = cancellation(&mut cancel) => {
                // Instances that finished before the abort still have to be stopped.
                starting.abort_all();
                while let Some(joined) = starting.join_next().await {
                    if let Ok((instance, item, Ok(()))) = joined {
                        ready.push((instance, item));
                    }
                }
                warn!(component, ready = ready.len(), "Deployment cancelled");
                stop_ready(component, ready, &context).await;
                resolver.resolve(Err(DeployError::Abandoned { component }));
                return None;
            }
        };
        let Some(joined) = joined else {
            break;
        };

        let failure = match joined {
            Ok((_, (instance, item, Ok(())))) => {
                debug!(component, instance, "Instance ready");
                ready.push((instance, item));
                continue;
            }
            Ok((_, (instance, _, Err(e)))) => {
                warn!(component, instance, error = %e, "Instance failed to start");
                DeployError::InstanceFailed {
                    component,
                    instance,
                    source: Box::new(e),
                }
            }
            Err(join_error) => match task_instances.get(&join_error.id()).copied() {
                Some(instance) if join_error.is_panic() => {
                    let message = panic_message(join_error.into_panic());
                    warn!(component, instance, %message, "Instance panicked during start");
                    DeployError::InstancePanicked {
                        component,
                        instance,
                        message,
                    }
                }
                Some(instance) => {
                    warn!(component, instance, "Instance task cancelled during start");
                    DeployError::InstanceCancelled {
                        component,
                        instance,
                    }
                }
                None => {
                    warn!(component, error = %join_error, "Unknown instance task failed");
                    DeployError::Abandoned { component }
                }
            },
        };
        // Only the first cause is reported; later ones are already logged above.
        first_failure.get_or_insert(failure);
    }

    if let Some(err) = first_failure {
        error!(component, error = %err, "Deployment failed");
        stop_ready(component, ready, &context).await;
        resolver.resolve(Err(err));
        return None;
    }

    ready.sort_by_key(|(instance, _)| *instance);
    info!(component, instances = count, "Deployed");
    resolver.resolve(Ok(()));

    Some(Deployment {
        component,
        instances: ready.into_iter().map(|(_, item)| item).collect(),
        context,
    })
}

/// Completes once cancellation is requested. Never completes if the requester is gone.
async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Rolls back instances that became ready.
async fn stop_ready<D: Deployable>(
    component: &'static str,
    ready: Vec<(usize, D)>,
    context: &D::Context,
) {
    for (instance, mut item) in ready {
        if let Err(e) = item.stop(context).await {
            warn!(component, instance, error = %e, "Rollback stop failed");
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A deployment whose signal may still be pending.
pub struct PendingDeployment<D: Deployable> {
    component: &'static str,
    signal: CompletionSignal,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Option<Deployment<D>>>,
}

impl<D: Deployable> PendingDeployment<D> {
    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }

    /// Waits for the signal and returns the running instances on success.
    pub async fn finish(self) -> Result<Deployment<D>, Arc<DeployError>> {
        self.signal.wait().await?;
        match self.task.await {
            Ok(Some(deployment)) => Ok(deployment),
            Ok(None) | Err(_) => Err(Arc::new(DeployError::Abandoned {
                component: self.component,
            })),
        }
    }

    /// Asks the deployment to cancel without waiting for it.
    pub fn request_cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancels the deployment and waits for it to settle.
    ///
    /// Instances still starting are aborted and ready ones are stopped; the signal then
    /// resolves as [`DeployError::Abandoned`]. If the deployment had already succeeded,
    /// the running instances are returned and the caller owns their shutdown.
    pub async fn cancel(self) -> Option<Deployment<D>> {
        self.request_cancel();
        self.task.await.ok().flatten()
    }
}

/// The ready instances of one successfully deployed component.
pub struct Deployment<D: Deployable> {
    component: &'static str,
    instances: Vec<D>,
    context: Arc<D::Context>,
}

impl<D: Deployable> Deployment<D> {
    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn instances(&self) -> &[D] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Stops every instance, reporting the first failure after trying all of them.
    pub async fn undeploy(self) -> Result<(), DeployError> {
        let component = self.component;
        let mut first_failure = None;

        for (instance, mut item) in self.instances.into_iter().enumerate() {
            if let Err(e) = item.stop(&self.context).await {
                warn!(component, instance, error = %e, "Instance failed to stop");
                first_failure.get_or_insert(DeployError::StopFailed {
                    component,
                    instance,
                    source: Box::new(e),
                });
            }
        }

        info!(component, "Undeployed");
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockComponent;
    use crate::signal::SignalState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_deploy_starts_all_instances() {
        let mock = MockComponent::new("cache");
        mock.expect_start().times(3).return_ready();

        let deployer = Deployer::new(Arc::new(()));
        let pending = deployer.deploy(&mock.spec(3));
        let deployment = pending.finish().await.unwrap();

        assert_eq!(deployment.len(), 3);
        assert_eq!(mock.started(), 3);
        mock.verify();
    }

    #[tokio::test]
    async fn test_zero_instances_fails() {
        let mock = MockComponent::new("empty");
        let deployer = Deployer::new(Arc::new(()));

        let pending = deployer.deploy(&mock.spec(0));
        let err = pending.finish().await.err().unwrap();

        assert!(matches!(
            err.as_ref(),
            DeployError::InvalidInstanceCount { component: "empty" }
        ));
        assert_eq!(mock.started(), 0);
    }

    #[tokio::test]
    async fn test_failed_instance_rolls_back_ready_siblings() {
        let mock = MockComponent::new("http");
        mock.expect_start().times(2).return_ready();
        mock.expect_start().return_failure("port in use");

        let deployer = Deployer::new(Arc::new(()));
        let pending = deployer.deploy(&mock.spec(3));
        let signal = pending.signal().clone();
        let err = pending.finish().await.err().unwrap();

        assert!(err.to_string().contains("port in use"));
        assert!(matches!(signal.state(), SignalState::Failed(_)));
        // Both ready instances were stopped before the signal resolved.
        assert_eq!(mock.stopped(), 2);
    }

    #[tokio::test]
    async fn test_panicking_instance_is_captured() {
        let mock = MockComponent::new("stream");
        mock.expect_start().return_ready();
        mock.expect_start().panic_with("boom");

        let deployer = Deployer::new(Arc::new(()));
        let err = deployer.deploy(&mock.spec(2)).finish().await.err().unwrap();

        match err.as_ref() {
            DeployError::InstancePanicked {
                component, message, ..
            } => {
                assert_eq!(*component, "stream");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_ready_instances() {
        let mock = MockComponent::new("http");
        mock.expect_start().return_ready();
        mock.expect_start().after(Duration::from_secs(30)).return_ready();

        let deployer = Deployer::new(Arc::new(()));
        let pending = deployer.deploy(&mock.spec(2));
        let signal = pending.signal().clone();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pending.cancel().await.is_none());

        assert_eq!(mock.ready(), 1);
        assert_eq!(mock.stopped(), 1);
        match signal.state() {
            SignalState::Failed(cause) => {
                assert!(matches!(cause.as_ref(), DeployError::Abandoned { component: "http" }))
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_after_success_returns_deployment() {
        let mock = MockComponent::new("cache");
        mock.expect_start().return_ready();

        let deployer = Deployer::new(Arc::new(()));
        let pending = deployer.deploy(&mock.spec(1));
        pending.signal().wait().await.unwrap();

        let deployment = pending.cancel().await.expect("deployment already succeeded");
        assert_eq!(mock.stopped(), 0);
        deployment.undeploy().await.unwrap();
        assert_eq!(mock.stopped(), 1);
    }

    #[tokio::test]
    async fn test_undeploy_stops_every_instance() {
        let mock = MockComponent::new("redis");
        mock.expect_start().times(2).return_ready();

        let deployer = Deployer::new(Arc::new(()));
        let deployment = deployer.deploy(&mock.spec(2)).finish().await.unwrap();
        deployment.undeploy().await.unwrap();

        assert_eq!(mock.stopped(), 2);
    }
}
