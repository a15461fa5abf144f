//! # Mock Components & Testing Guide
//!
//! [`MockComponent`] is a scriptable component for testing deployment and bootstrap logic
//! without touching sockets or external services. Each instance the deployer creates takes
//! the next scripted expectation: become ready, fail with a message, or panic, optionally
//! after a delay. The mock records when instances started, became ready and stopped, which
//! lets tests assert ordering and concurrency.
//!
//! ## When to use Mocks vs Real Components
//!
//! | Feature | MockComponent | Real Component |
//! |---------|---------------|----------------|
//! | **Speed** | Instant (in-memory) | Needs sockets / peers |
//! | **Determinism** | Scripted outcomes | Subject to the environment |
//! | **Error Injection** | Easy (`return_failure`, `panic_with`) | Hard |
//! | **Use Case** | Supervision protocol | Component behaviour itself |
//!
//! ## Example
//!
//! ```rust
//! use deploy_framework::mock::MockComponent;
//! use deploy_framework::{Bootstrap, TrustRegistry, TrustSettings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = MockComponent::new("cache");
//!     cache.expect_start().return_ready();
//!
//!     let http = MockComponent::new("http");
//!     http.expect_start().times(4).return_ready();
//!     http.expect_start().return_failure("address in use");
//!
//!     let registry = Arc::new(TrustRegistry::new());
//!     let bootstrap = Bootstrap::new(vec![cache.spec(1), http.spec(5)])
//!         .with_trust(TrustSettings::default(), registry);
//!
//!     let outcome = bootstrap.start(|_trust, _gate| ()).await;
//!     assert!(outcome.is_err());
//!     cache.verify();
//!     http.verify();
//! }
//! ```

use crate::component::{ComponentSpec, Deployable};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

#[derive(Debug, Clone)]
enum Behavior {
    Ready,
    Fail(String),
    Panic(String),
}

#[derive(Debug, Clone)]
struct Expectation {
    behavior: Behavior,
    delay: Option<Duration>,
}

/// Error returned by a mock instance scripted to fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// A lifecycle event recorded by a mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEventKind {
    Started,
    Ready,
    Failed,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct MockEvent {
    pub instance: usize,
    pub kind: MockEventKind,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Mutex<VecDeque<Expectation>>,
    events: Mutex<Vec<MockEvent>>,
    created: AtomicUsize,
}

impl MockState {
    fn record(&self, instance: usize, kind: MockEventKind) {
        self.events.lock().unwrap().push(MockEvent {
            instance,
            kind,
            at: Instant::now(),
        });
    }

    fn count(&self, kind: MockEventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

/// A scriptable component with expectation tracking.
#[derive(Debug, Clone)]
pub struct MockComponent {
    name: &'static str,
    state: Arc<MockState>,
}

impl MockComponent {
    /// Creates a mock with no expectations.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(MockState::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a spec deploying `instances` instances of this mock.
    pub fn spec(&self, instances: usize) -> ComponentSpec<MockInstance> {
        let state = Arc::clone(&self.state);
        ComponentSpec::new(self.name, instances, move |_ctx: &()| {
            let index = state.created.fetch_add(1, Ordering::SeqCst);
            let expectation = state.expectations.lock().unwrap().pop_front();
            MockInstance {
                index,
                expectation,
                state: Arc::clone(&state),
            }
        })
    }

    /// Expects one more instance to be started.
    pub fn expect_start(&self) -> StartExpectationBuilder {
        StartExpectationBuilder {
            times: 1,
            delay: None,
            state: Arc::clone(&self.state),
        }
    }

    pub fn started(&self) -> usize {
        self.state.count(MockEventKind::Started)
    }

    pub fn ready(&self) -> usize {
        self.state.count(MockEventKind::Ready)
    }

    pub fn failed(&self) -> usize {
        self.state.count(MockEventKind::Failed)
    }

    pub fn stopped(&self) -> usize {
        self.state.count(MockEventKind::Stopped)
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.events.lock().unwrap().clone()
    }

    /// When the first instance began initializing.
    pub fn first_started_at(&self) -> Option<Instant> {
        self.event_times(MockEventKind::Started).min()
    }

    /// When the last instance reported ready.
    pub fn last_ready_at(&self) -> Option<Instant> {
        self.event_times(MockEventKind::Ready).max()
    }

    fn event_times(&self, kind: MockEventKind) -> impl Iterator<Item = Instant> {
        self.events()
            .into_iter()
            .filter(move |e| e.kind == kind)
            .map(|e| e.at)
    }

    /// Verifies that all expectations were consumed.
    pub fn verify(&self) {
        let exps = self.state.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!(
                "Not all expectations for {} were met. {} remaining",
                self.name,
                exps.len()
            );
        }
    }
}

/// Builder for `start` expectations.
pub struct StartExpectationBuilder {
    times: usize,
    delay: Option<Duration>,
    state: Arc<MockState>,
}

impl StartExpectationBuilder {
    /// Applies the expectation to the next `times` instances.
    pub fn times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    /// Delays the outcome, simulating slow initialization.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The instance reports ready.
    pub fn return_ready(self) {
        self.push(Behavior::Ready);
    }

    /// The instance fails to initialize with `message`.
    pub fn return_failure(self, message: impl Into<String>) {
        self.push(Behavior::Fail(message.into()));
    }

    /// The instance panics during initialization.
    pub fn panic_with(self, message: impl Into<String>) {
        self.push(Behavior::Panic(message.into()));
    }

    fn push(self, behavior: Behavior) {
        let mut exps = self.state.expectations.lock().unwrap();
        for _ in 0..self.times {
            exps.push_back(Expectation {
                behavior: behavior.clone(),
                delay: self.delay,
            });
        }
    }
}

/// One instance produced by a [`MockComponent`] spec.
#[derive(Debug)]
pub struct MockInstance {
    index: usize,
    expectation: Option<Expectation>,
    state: Arc<MockState>,
}

impl MockInstance {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[async_trait]
impl Deployable for MockInstance {
    type Context = ();
    type Error = MockError;

    async fn start(&mut self, _ctx: &()) -> Result<(), MockError> {
        self.state.record(self.index, MockEventKind::Started);

        let Some(expectation) = self.expectation.clone() else {
            self.state.record(self.index, MockEventKind::Failed);
            return Err(MockError(format!("unexpected start of instance {}", self.index)));
        };

        if let Some(delay) = expectation.delay {
            tokio::time::sleep(delay).await;
        }

        match expectation.behavior {
            Behavior::Ready => {
                self.state.record(self.index, MockEventKind::Ready);
                Ok(())
            }
            Behavior::Fail(message) => {
                self.state.record(self.index, MockEventKind::Failed);
                Err(MockError(message))
            }
            Behavior::Panic(message) => {
                self.state.record(self.index, MockEventKind::Failed);
                panic!("{}", message);
            }
        }
    }

    async fn stop(&mut self, _ctx: &()) -> Result<(), MockError> {
        self.state.record(self.index, MockEventKind::Stopped);
        Ok(())
    }
}
