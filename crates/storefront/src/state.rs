//! Application state shared across handlers.

use std::sync::Arc;

use losia_core::{
    DemoImageAssigner, DemoImageError, OrderCodeGenerator, PricingPolicy, SystemClock,
};

use crate::backend::{BackendError, HttpBackend, MemoryBackend, StorefrontBackend};
use crate::config::{BackendMode, EcoImpactSourceKind, StorefrontConfig};
use crate::services::{
    CheckoutOrchestrator, CheckoutSettings, EcoImpactResolver, LoggingSink,
    NotificationDispatcher, NotificationSink, RetryPolicy, ValidationTrackers, VoucherValidator,
    WebhookSink,
};

/// Error assembling application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("demo image pool: {0}")]
    DemoImage(#[from] DemoImageError),
    #[error("HTTP backend needs a base URL and token")]
    MissingBackendCredentials,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// backend collaborators and the services built on them.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: StorefrontBackend,
    validator: VoucherValidator,
    trackers: ValidationTrackers,
    checkout: CheckoutOrchestrator,
    eco_impact: EcoImpactResolver,
    demo_images: DemoImageAssigner,
}

impl AppState {
    /// Build state from configuration, choosing the backend and
    /// notification sink it names.
    ///
    /// Must be called inside a Tokio runtime; it spawns the notification
    /// worker.
    ///
    /// # Errors
    ///
    /// Returns an error if a client cannot be built or the demo image pool
    /// is empty.
    pub fn from_config(config: StorefrontConfig) -> Result<Self, StateError> {
        let backend = match config.backend.mode {
            BackendMode::Http => {
                let (Some(url), Some(token)) = (&config.backend.base_url, &config.backend.token)
                else {
                    return Err(StateError::MissingBackendCredentials);
                };
                let http = HttpBackend::new(url.clone(), token.clone(), config.backend.timeout)?;
                StorefrontBackend::from_shared(Arc::new(http))
            }
            BackendMode::Memory => {
                tracing::warn!("Using in-memory backend; nothing is persisted");
                StorefrontBackend::from_shared(Arc::new(MemoryBackend::seeded()))
            }
        };

        let sink: Arc<dyn NotificationSink> = match &config.notifications.webhook_url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(config.backend.timeout)
                    .build()?;
                Arc::new(WebhookSink::new(client, url.clone()))
            }
            None => Arc::new(LoggingSink),
        };

        Self::new(config, backend, sink)
    }

    /// Create a new application state around explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured demo image pool is empty.
    pub fn new(
        config: StorefrontConfig,
        backend: StorefrontBackend,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, StateError> {
        let backend = match config.eco_impact.source {
            EcoImpactSourceKind::Table => {
                backend.with_eco_impact(Arc::new(config.eco_impact.table.clone()))
            }
            EcoImpactSourceKind::Backend => backend,
        };

        let demo_images = DemoImageAssigner::new(config.demo_image_pool.clone())?;
        let validator = VoucherValidator::new(Arc::clone(&backend.vouchers), Arc::new(SystemClock));

        // Detached: runs until the last dispatcher clone is dropped.
        let (dispatcher, _worker) =
            NotificationDispatcher::spawn(sink, config.notifications.queue_capacity);

        let settings = CheckoutSettings {
            pricing: config.pricing,
            retry: RetryPolicy {
                base: config.checkout.retry_base,
                jitter: config.checkout.retry_jitter,
            },
            code_prefix: config.checkout.order_code_prefix.clone(),
        };
        let checkout = CheckoutOrchestrator::new(
            &backend,
            validator.clone(),
            dispatcher,
            OrderCodeGenerator::default(),
            settings,
        );
        let eco_impact =
            EcoImpactResolver::new(Arc::clone(&backend.catalog), Arc::clone(&backend.eco_impact));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                validator,
                trackers: ValidationTrackers::default(),
                checkout,
                eco_impact,
                demo_images,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingPolicy {
        &self.inner.config.pricing
    }

    #[must_use]
    pub fn backend(&self) -> &StorefrontBackend {
        &self.inner.backend
    }

    #[must_use]
    pub fn validator(&self) -> &VoucherValidator {
        &self.inner.validator
    }

    #[must_use]
    pub fn trackers(&self) -> &ValidationTrackers {
        &self.inner.trackers
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.inner.checkout
    }

    #[must_use]
    pub fn eco_impact(&self) -> &EcoImpactResolver {
        &self.inner.eco_impact
    }

    #[must_use]
    pub fn demo_images(&self) -> &DemoImageAssigner {
        &self.inner.demo_images
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_state_builds() {
        let state = AppState::from_config(StorefrontConfig::in_memory()).unwrap();
        assert_eq!(state.demo_images().pool().len(), 12);
        assert_eq!(state.pricing(), &PricingPolicy::default());
    }

    #[tokio::test]
    async fn test_empty_demo_pool_refused() {
        let mut config = StorefrontConfig::in_memory();
        config.demo_image_pool.clear();
        let err = AppState::from_config(config).err().unwrap();
        assert!(matches!(err, StateError::DemoImage(_)));
    }

    #[tokio::test]
    async fn test_http_mode_needs_credentials() {
        let mut config = StorefrontConfig::in_memory();
        config.backend.mode = BackendMode::Http;
        let err = AppState::from_config(config).err().unwrap();
        assert!(matches!(err, StateError::MissingBackendCredentials));
    }
}
