//! # Trust Configuration
//!
//! Network-capable components need to know which trust store and trust anchors to use
//! when they open TLS connections. Both locations come from the environment and both are
//! optional: an absent value leaves the system default in place and is never an error.
//!
//! The effective settings are recorded in a [`TrustRegistry`] (process-scoped via
//! [`TrustRegistry::global`]) and are also handed to every component explicitly through
//! its deployment context. The orchestrator installs them before any deployment starts.
//!
//! The global registry also exports present values as `SSL_CERT_FILE` (trust store) and
//! `SSL_CERT_DIR` (trust anchors), the process-wide trust inputs read by OpenSSL and by
//! `rustls-native-certs`. Isolated registries never touch the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::info;

/// Environment variable naming the trust store location.
pub const TRUST_STORE_ENV: &str = "TRUST_STORE";
/// Environment variable naming the trust anchors location.
pub const TRUST_ANCHORS_ENV: &str = "TRUST_ANCHORS";
/// Trust root file read by TLS stacks.
pub const SSL_CERT_FILE_ENV: &str = "SSL_CERT_FILE";
/// Trust root directory read by TLS stacks.
pub const SSL_CERT_DIR_ENV: &str = "SSL_CERT_DIR";

/// Trust locations requested for this process. `None` means "keep the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustSettings {
    pub trust_store: Option<PathBuf>,
    pub trust_anchors: Option<PathBuf>,
}

impl TrustSettings {
    /// Reads both locations from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads both locations through `lookup`. Empty values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };
        Self {
            trust_store: read(TRUST_STORE_ENV),
            trust_anchors: read(TRUST_ANCHORS_ENV),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.trust_store.is_none() && self.trust_anchors.is_none()
    }

    /// The TLS environment variables these settings map to, for present values only.
    pub fn tls_env(&self) -> Vec<(&'static str, &Path)> {
        let store = self
            .trust_store
            .as_deref()
            .map(|path| (SSL_CERT_FILE_ENV, path));
        let anchors = self
            .trust_anchors
            .as_deref()
            .map(|path| (SSL_CERT_DIR_ENV, path));
        store.into_iter().chain(anchors).collect()
    }
}

/// Process-scoped record of the effective trust configuration.
#[derive(Debug, Default)]
pub struct TrustRegistry {
    current: RwLock<TrustSettings>,
    export_env: bool,
}

impl TrustRegistry {
    /// Creates an isolated registry holding the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that also exports installed values to the TLS environment.
    pub fn exporting() -> Self {
        Self {
            current: RwLock::default(),
            export_env: true,
        }
    }

    /// The registry shared by the whole process. It exports to the TLS environment.
    pub fn global() -> Arc<TrustRegistry> {
        static GLOBAL: OnceLock<Arc<TrustRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TrustRegistry::exporting())))
    }

    /// Installs every present value of `settings` and returns the effective configuration.
    ///
    /// Absent values leave the current value untouched, so installing the same settings
    /// again yields the same configuration.
    pub fn install(&self, settings: &TrustSettings) -> TrustSettings {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);

        match &settings.trust_store {
            Some(path) => {
                info!(path = %path.display(), "Setting trust store");
                current.trust_store = Some(path.clone());
            }
            None => info!("Trust store not set"),
        }

        match &settings.trust_anchors {
            Some(path) => {
                info!(path = %path.display(), "Setting trust anchors");
                current.trust_anchors = Some(path.clone());
            }
            None => info!("Trust anchors not set"),
        }

        if self.export_env {
            // Runs before any deployment, so no component reads the environment concurrently.
            for (key, path) in settings.tls_env() {
                std::env::set_var(key, path);
                info!(var = key, path = %path.display(), "Exported trust location");
            }
        }

        current.clone()
    }

    /// The effective configuration.
    pub fn current(&self) -> TrustSettings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_absent_inputs_leave_defaults() {
        let settings = TrustSettings::from_lookup(lookup(&[]));
        assert!(settings.is_empty());

        let registry = TrustRegistry::new();
        let effective = registry.install(&settings);
        assert_eq!(effective, TrustSettings::default());
        assert_eq!(registry.current(), TrustSettings::default());
    }

    #[test]
    fn test_empty_values_count_as_absent() {
        let settings = TrustSettings::from_lookup(lookup(&[
            (TRUST_STORE_ENV, "  "),
            (TRUST_ANCHORS_ENV, ""),
        ]));
        assert!(settings.is_empty());
    }

    #[test]
    fn test_install_is_idempotent() {
        let settings = TrustSettings::from_lookup(lookup(&[
            (TRUST_STORE_ENV, "/etc/pki/store"),
            (TRUST_ANCHORS_ENV, "/etc/pki/anchors"),
        ]));
        let registry = TrustRegistry::new();

        let first = registry.install(&settings);
        let second = registry.install(&settings);

        assert_eq!(first, second);
        assert_eq!(first.trust_store, Some(PathBuf::from("/etc/pki/store")));
        assert_eq!(first.trust_anchors, Some(PathBuf::from("/etc/pki/anchors")));
    }

    #[test]
    fn test_tls_env_maps_present_values_only() {
        let settings = TrustSettings {
            trust_store: None,
            trust_anchors: Some(PathBuf::from("/etc/pki/anchors")),
        };
        assert_eq!(
            settings.tls_env(),
            vec![(SSL_CERT_DIR_ENV, Path::new("/etc/pki/anchors"))]
        );
        assert!(TrustSettings::default().tls_env().is_empty());
    }

    #[test]
    fn test_exporting_registry_sets_tls_environment() {
        let registry = TrustRegistry::exporting();
        registry.install(&TrustSettings {
            trust_store: Some(PathBuf::from("/tmp/deploy-framework/store.pem")),
            trust_anchors: Some(PathBuf::from("/tmp/deploy-framework/anchors")),
        });

        assert_eq!(
            std::env::var(SSL_CERT_FILE_ENV).unwrap(),
            "/tmp/deploy-framework/store.pem"
        );
        assert_eq!(
            std::env::var(SSL_CERT_DIR_ENV).unwrap(),
            "/tmp/deploy-framework/anchors"
        );
    }

    #[test]
    fn test_absent_value_keeps_previously_installed_one() {
        let registry = TrustRegistry::new();
        registry.install(&TrustSettings {
            trust_store: Some(PathBuf::from("/etc/pki/store")),
            trust_anchors: None,
        });

        let effective = registry.install(&TrustSettings::default());
        assert_eq!(effective.trust_store, Some(PathBuf::from("/etc/pki/store")));
    }
}
