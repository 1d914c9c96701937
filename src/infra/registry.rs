//! Store registry: owns every live store handle.
//!
//! Initialization is "mandatory primary, best-effort optional": a primary
//! store failure aborts startup, any other failure leaves that kind absent
//! and the service runs degraded.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use tokio::sync::{watch, RwLock, RwLockReadGuard};

use super::cache::RedisCache;
use super::db::PrimaryStore;
use super::document::DocumentStore;
use super::search::SearchStore;
use super::store::{CacheStore, StoreError, StoreHandle, StoreKind, StoreResult};
use crate::config::Config;
use crate::errors::{AppError, AppResult};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Opens a connection for one store kind.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, kind: StoreKind, config: &Config) -> StoreResult<Arc<dyn StoreHandle>>;
}

/// Connector backed by the native drivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverConnector;

#[async_trait]
impl StoreConnector for DriverConnector {
    async fn connect(&self, kind: StoreKind, config: &Config) -> StoreResult<Arc<dyn StoreHandle>> {
        let connect_timeout = config.connect_timeout;

        let handle: Arc<dyn StoreHandle> = match kind {
            StoreKind::Primary => Arc::new(
                PrimaryStore::connect(&config.primary, connect_timeout, config.close_timeout)
                    .await?,
            ),
            StoreKind::Cache => Arc::new(RedisCache::connect(&config.cache, connect_timeout).await?),
            StoreKind::SearchIndex => Arc::new(
                SearchStore::connect(&config.search, connect_timeout, config.probe_timeout).await?,
            ),
            StoreKind::Document => Arc::new(
                DocumentStore::connect(&config.document, connect_timeout, config.close_timeout)
                    .await?,
            ),
        };
        Ok(handle)
    }
}

/// Read lease held while a caller uses handles in the background.
///
/// `close_all` waits for outstanding leases before closing anything.
pub type RegistryLease<'a> = RwLockReadGuard<'a, bool>;

/// Owner of every successfully initialized store handle.
pub struct StoreRegistry {
    handles: BTreeMap<StoreKind, Arc<dyn StoreHandle>>,
    closed: RwLock<bool>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("kinds", &self.handles.keys().collect::<Vec<_>>())
            .field("shutting_down", &*self.shutdown.borrow())
            .finish()
    }
}

async fn bounded_connect(
    connector: &dyn StoreConnector,
    kind: StoreKind,
    config: &Config,
) -> StoreResult<Arc<dyn StoreHandle>> {
    tokio::time::timeout(config.connect_timeout, connector.connect(kind, config))
        .await
        .unwrap_or(Err(StoreError::Timeout(config.connect_timeout)))
}

impl StoreRegistry {
    /// Connect every enabled store through the native drivers.
    pub async fn connect(config: &Config) -> AppResult<Self> {
        Self::initialize(config, &DriverConnector).await
    }

    /// Connect every enabled store through `connector`.
    ///
    /// The primary store is connected first; its failure is returned as
    /// [`AppError::PrimaryStoreUnavailable`]. Optional stores are then
    /// connected concurrently and a failure only leaves that kind absent.
    /// Every attempt is bounded by `config.connect_timeout`.
    pub async fn initialize(config: &Config, connector: &dyn StoreConnector) -> AppResult<Self> {
        let primary = bounded_connect(connector, StoreKind::Primary, config)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Primary store unavailable");
                AppError::PrimaryStoreUnavailable(e)
            })?;

        let mut handles = BTreeMap::new();
        handles.insert(StoreKind::Primary, primary);

        let optional: Vec<StoreKind> = StoreKind::ALL
            .into_iter()
            .filter(|kind| !kind.is_mandatory())
            .filter(|kind| {
                let enabled = is_enabled(config, *kind);
                if !enabled {
                    tracing::info!(store = %kind, "Store disabled by configuration, skipping");
                }
                enabled
            })
            .collect();

        let attempts = futures::future::join_all(optional.into_iter().map(|kind| async move {
            (kind, bounded_connect(connector, kind, config).await)
        }))
        .await;

        for (kind, result) in attempts {
            match result {
                Ok(handle) => {
                    handles.insert(kind, handle);
                }
                Err(e) => {
                    tracing::warn!(
                        store = %kind,
                        error = %e,
                        "{} unavailable, continuing without it",
                        kind.label()
                    );
                }
            }
        }

        tracing::info!(
            stores = ?handles.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Store registry initialized"
        );
        Ok(Self::from_handles(handles.into_values()))
    }

    /// Build a registry from already connected handles.
    ///
    /// A later handle of the same kind replaces an earlier one.
    pub fn from_handles<I>(handles: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn StoreHandle>>,
    {
        let handles = handles.into_iter().map(|h| (h.kind(), h)).collect();
        let (shutdown, _) = watch::channel(false);

        Self {
            handles,
            closed: RwLock::new(false),
            shutdown,
        }
    }

    /// Handle for `kind`, or `None` when that store is unavailable.
    pub fn get(&self, kind: StoreKind) -> Option<&Arc<dyn StoreHandle>> {
        self.handles.get(&kind)
    }

    /// Cache capability of the registered cache store.
    pub fn cache(&self) -> Option<&dyn CacheStore> {
        self.get(StoreKind::Cache).and_then(|handle| handle.as_cache())
    }

    /// SQL connection of the primary store, for issuing queries.
    pub fn primary(&self) -> Option<&DatabaseConnection> {
        self.get(StoreKind::Primary).and_then(|handle| handle.as_primary())
    }

    /// Search index client.
    pub fn search(&self) -> Option<&SearchStore> {
        self.get(StoreKind::SearchIndex).and_then(|handle| handle.as_search())
    }

    /// Document store driver client.
    pub fn document(&self) -> Option<&mongodb::Client> {
        self.get(StoreKind::Document).and_then(|handle| handle.as_document())
    }

    /// Registered kinds in `StoreKind` order.
    pub fn kinds(&self) -> impl Iterator<Item = StoreKind> + '_ {
        self.handles.keys().copied()
    }

    /// Registered handles in `StoreKind` order.
    pub fn handles(&self) -> impl Iterator<Item = &Arc<dyn StoreHandle>> + '_ {
        self.handles.values()
    }

    pub fn contains(&self, kind: StoreKind) -> bool {
        self.handles.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Receiver that flips to `true` once teardown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Take a read lease, or `None` once teardown has begun.
    pub async fn lease(&self) -> Option<RegistryLease<'_>> {
        let guard = self.closed.read().await;
        if *guard {
            None
        } else {
            Some(guard)
        }
    }

    /// Close every handle exactly once.
    ///
    /// Raises the shutdown signal, waits for outstanding leases, then closes
    /// handles in `StoreKind` order, continuing past failures. Returns every
    /// failure encountered; a repeated call returns an empty list.
    pub async fn close_all(&self) -> Vec<StoreError> {
        self.shutdown.send_replace(true);

        let mut closed = self.closed.write().await;
        if *closed {
            return Vec::new();
        }
        *closed = true;

        let mut errors = Vec::new();
        for (kind, handle) in &self.handles {
            match handle.close().await {
                Ok(()) => tracing::debug!(store = %kind, "Store closed"),
                Err(e) => {
                    tracing::error!(store = %kind, error = %e, "Failed to close store");
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            tracing::info!("All store connections closed");
        } else {
            tracing::warn!(failures = errors.len(), "Store connections closed with errors");
        }
        errors
    }
}

fn is_enabled(config: &Config, kind: StoreKind) -> bool {
    match kind {
        StoreKind::Primary => true,
        StoreKind::Cache => config.cache.enabled,
        StoreKind::SearchIndex => config.search.enabled,
        StoreKind::Document => config.document.enabled,
    }
}
