//! # Tracking Service Library
//!
//! This library exposes the tracking service's components, configuration and lifecycle
//! for the binary and for integration testing.

pub mod components;
pub mod config;
pub mod error;
pub mod lifecycle;
