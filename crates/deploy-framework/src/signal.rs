//! # Completion Signals
//!
//! A [`CompletionSignal`] is the one-shot, tri-state readiness notification of one
//! component: `Pending`, then exactly one of `Succeeded` or `Failed`. The writing half,
//! [`SignalResolver`], is consumed by [`SignalResolver::resolve`], so the type system
//! guarantees a signal is resolved at most once. Readers are cheap clones and may observe
//! the signal any number of times once it has resolved.

use crate::error::DeployError;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable state of a [`CompletionSignal`].
#[derive(Debug, Clone)]
pub enum SignalState {
    Pending,
    Succeeded,
    Failed(Arc<DeployError>),
}

impl SignalState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, SignalState::Pending)
    }
}

/// Creates a connected resolver/signal pair for the named component.
pub fn completion_signal(component: &'static str) -> (SignalResolver, CompletionSignal) {
    let (sender, receiver) = watch::channel(SignalState::Pending);
    (
        SignalResolver { component, sender },
        CompletionSignal {
            component,
            receiver,
        },
    )
}

/// Write half of a completion signal. Owned by exactly one deployment.
#[derive(Debug)]
pub struct SignalResolver {
    component: &'static str,
    sender: watch::Sender<SignalState>,
}

impl SignalResolver {
    /// Resolves the signal. Consumes the resolver, so this can happen only once.
    pub fn resolve(self, outcome: Result<(), DeployError>) {
        let state = match outcome {
            Ok(()) => SignalState::Succeeded,
            Err(e) => SignalState::Failed(Arc::new(e)),
        };
        // send_replace stores the value even when every reader is gone.
        self.sender.send_replace(state);
    }

    pub fn component(&self) -> &'static str {
        self.component
    }
}

/// Read half of a completion signal.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    component: &'static str,
    receiver: watch::Receiver<SignalState>,
}

impl CompletionSignal {
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Current state without waiting.
    pub fn state(&self) -> SignalState {
        self.receiver.borrow().clone()
    }

    /// Waits until the signal resolves.
    ///
    /// A resolver dropped without resolving is reported as [`DeployError::Abandoned`].
    pub async fn wait(&self) -> Result<(), Arc<DeployError>> {
        let mut receiver = self.receiver.clone();
        let resolved = receiver
            .wait_for(SignalState::is_resolved)
            .await
            .map(|state| state.clone());
        match resolved {
            Ok(SignalState::Succeeded) => Ok(()),
            Ok(SignalState::Failed(e)) => Err(e),
            Ok(SignalState::Pending) | Err(_) => Err(Arc::new(DeployError::Abandoned {
                component: self.component,
            })),
        }
    }
}
