//! # Framework Errors
//!
//! This module defines the common error types used throughout the deployment framework.
//! Failures are converted into values at the lowest level they occur: an instance that
//! fails becomes a [`DeployError`] on its component's signal, and failed signals are
//! aggregated into a [`BootstrapError`] by the orchestrator.

use std::sync::Arc;
use std::time::Duration;

/// Errors that can resolve a component's [`CompletionSignal`](crate::CompletionSignal).
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Instance {instance} of {component} failed to start: {source}")]
    InstanceFailed {
        component: &'static str,
        instance: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Instance {instance} of {component} panicked during start: {message}")]
    InstancePanicked {
        component: &'static str,
        instance: usize,
        message: String,
    },
    #[error("Instance {instance} of {component} was cancelled before it finished starting")]
    InstanceCancelled {
        component: &'static str,
        instance: usize,
    },
    #[error("Component {component} requested zero instances")]
    InvalidInstanceCount { component: &'static str },
    #[error("Deployment of {component} was abandoned before completing")]
    Abandoned { component: &'static str },
    #[error("Instance {instance} of {component} failed to stop: {source}")]
    StopFailed {
        component: &'static str,
        instance: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DeployError {
    /// Name of the component whose deployment produced this error.
    pub fn component(&self) -> &'static str {
        match self {
            DeployError::InstanceFailed { component, .. }
            | DeployError::InstancePanicked { component, .. }
            | DeployError::InstanceCancelled { component, .. }
            | DeployError::InvalidInstanceCount { component }
            | DeployError::Abandoned { component }
            | DeployError::StopFailed { component, .. } => component,
        }
    }
}

/// Terminal outcome of a bootstrap that did not reach `Running`.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("{} component(s) failed to deploy: {}", .failures.len(), first_cause(.failures))]
    DeploymentFailed {
        failures: Vec<Arc<DeployError>>,
        succeeded: Vec<&'static str>,
    },
    #[error("Startup did not complete within {after:?}; still pending: {pending:?}")]
    StartupTimedOut {
        after: Duration,
        pending: Vec<&'static str>,
    },
}

impl BootstrapError {
    /// The first captured component failure, if any.
    pub fn root_cause(&self) -> Option<&DeployError> {
        match self {
            BootstrapError::DeploymentFailed { failures, .. } => {
                failures.first().map(|e| e.as_ref())
            }
            BootstrapError::StartupTimedOut { .. } => None,
        }
    }

    /// Names of the components that caused this outcome.
    pub fn failed_components(&self) -> Vec<&'static str> {
        match self {
            BootstrapError::DeploymentFailed { failures, .. } => {
                failures.iter().map(|e| e.component()).collect()
            }
            BootstrapError::StartupTimedOut { pending, .. } => pending.clone(),
        }
    }
}

fn first_cause(failures: &[Arc<DeployError>]) -> String {
    failures
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no cause captured".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_instance_is_not_reported_as_panic() {
        let err = DeployError::InstanceCancelled {
            component: "stream",
            instance: 3,
        };

        assert_eq!(err.component(), "stream");
        assert_eq!(
            err.to_string(),
            "Instance 3 of stream was cancelled before it finished starting"
        );
        assert!(!err.to_string().contains("panicked"));
    }
}
