use crate::components::{
    BackingStoreConnector, CacheComponent, Component, HttpFrontEnd, ServiceContext,
    StreamConnector, CACHE, HTTP, REDIS, STREAM,
};
use crate::config::ServiceConfig;
use deploy_framework::{
    Bootstrap, BootstrapError, ComponentSpec, RunningSystem, TrustRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// The started service: every component is deployed and traffic is flowing.
pub type RunningService = RunningSystem<Component>;

/// Declares and starts the tracking service.
///
/// The component set is fixed: one backing-store connector, one cache, and the
/// configured number of HTTP front-end and stream-connector instances.
pub struct TrackingSystem;

impl TrackingSystem {
    /// The managed components, in deployment order.
    pub fn component_specs(config: &ServiceConfig) -> Vec<ComponentSpec<Component>> {
        vec![
            ComponentSpec::new(REDIS, 1, |_: &ServiceContext| {
                Component::BackingStore(BackingStoreConnector::new())
            }),
            ComponentSpec::new(CACHE, 1, |_: &ServiceContext| {
                Component::Cache(CacheComponent::new())
            }),
            ComponentSpec::new(HTTP, config.http.instances, |_: &ServiceContext| {
                Component::HttpFrontEnd(HttpFrontEnd::new())
            }),
            ComponentSpec::new(STREAM, config.stream.instances, |_: &ServiceContext| {
                Component::StreamConnector(StreamConnector::new())
            }),
        ]
    }

    /// Starts the service, recording trust settings in the process-wide registry.
    ///
    /// # Errors
    ///
    /// Returns the [`BootstrapError`] if any component failed to deploy. Nothing is left
    /// running in that case.
    pub async fn start(config: ServiceConfig) -> Result<RunningService, BootstrapError> {
        Self::start_with_registry(config, TrustRegistry::global()).await
    }

    /// Like [`TrackingSystem::start`], recording trust settings in `registry`.
    pub async fn start_with_registry(
        config: ServiceConfig,
        registry: Arc<TrustRegistry>,
    ) -> Result<RunningService, BootstrapError> {
        info!(
            http_instances = config.http.instances,
            stream_instances = config.stream.instances,
            "Starting tracking service"
        );

        Bootstrap::new(Self::component_specs(&config))
            .with_trust(config.trust.clone(), registry)
            .with_startup_timeout(config.startup_timeout())
            .start(move |trust, gate| ServiceContext::new(config, trust, gate))
            .await
    }
}

/// Addresses the HTTP front-end instances of `system` are bound to.
pub fn http_addrs(system: &RunningService) -> Vec<SocketAddr> {
    system
        .deployment(HTTP)
        .map(|deployment| {
            deployment
                .instances()
                .iter()
                .filter_map(|component| match component {
                    Component::HttpFrontEnd(http) => http.local_addr(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_specs_match_service_layout() {
        let specs = TrackingSystem::component_specs(&ServiceConfig::default());
        let layout: Vec<(&str, usize)> = specs
            .iter()
            .map(|spec| (spec.name(), spec.instances()))
            .collect();

        assert_eq!(
            layout,
            vec![("redis", 1), ("cache", 1), ("http", 5), ("stream", 5)]
        );
    }

    #[test]
    fn test_instance_counts_follow_config() {
        let mut config = ServiceConfig::default();
        config.http.instances = 2;
        config.stream.instances = 3;

        let specs = TrackingSystem::component_specs(&config);
        assert_eq!(specs[2].instances(), 2);
        assert_eq!(specs[3].instances(), 3);
    }
}
