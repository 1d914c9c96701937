//! Document store: MongoDB through the official driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::event::cmap::CmapEvent;
use mongodb::event::EventHandler;
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde_json::json;

use crate::config::{DocumentConfig, DEFAULT_MONGODB_MAX_POOL_SIZE, MONGODB_ADMIN_DATABASE};
use crate::infra::store::{
    ConnectionGauge, HealthDetails, PoolStats, StoreError, StoreHandle, StoreKind, StoreResult,
};

/// MongoDB handle. The driver maintains its own connection pool, observed
/// through its connection monitoring events.
pub struct DocumentStore {
    client: Client,
    pool: Arc<ConnectionGauge>,
    max_pool_size: u32,
    close_timeout: Duration,
    closed: AtomicBool,
}

impl DocumentStore {
    /// Create the client and verify it with a `ping` command.
    pub async fn connect(
        config: &DocumentConfig,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> StoreResult<Self> {
        let mut options = ClientOptions::parse(config.uri()).await?;
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(connect_timeout);

        let pool = Arc::new(ConnectionGauge::new());
        let events = pool.clone();
        options.cmap_event_handler = Some(EventHandler::callback(move |event: CmapEvent| {
            record_pool_event(&events, &event)
        }));
        let max_pool_size = options.max_pool_size.unwrap_or(DEFAULT_MONGODB_MAX_POOL_SIZE);

        let store = Self {
            client: Client::with_options(options)?,
            pool,
            max_pool_size,
            close_timeout,
            closed: AtomicBool::new(false),
        };

        tokio::time::timeout(connect_timeout, store.run_ping())
            .await
            .map_err(|_| StoreError::Timeout(connect_timeout))??;

        tracing::info!("MongoDB connected");
        Ok(store)
    }

    async fn run_ping(&self) -> StoreResult<f64> {
        let reply = self
            .client
            .database(MONGODB_ADMIN_DATABASE)
            .run_command(doc! { "ping": 1 })
            .await?;

        // `ok` comes back as a double or an integer depending on server version
        let ok = reply
            .get_f64("ok")
            .or_else(|_| reply.get_i32("ok").map(f64::from))
            .unwrap_or(0.0);
        Ok(ok)
    }
}

#[async_trait]
impl StoreHandle for DocumentStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    async fn ping(&self) -> StoreResult<()> {
        self.describe_health().await.map(|_| ())
    }

    async fn describe_health(&self) -> StoreResult<HealthDetails> {
        if self.is_closed() {
            return Err(StoreError::Closed(StoreKind::Document));
        }

        let ok = self.run_ping().await?;

        let mut details = HealthDetails::new();
        details.insert("ok".into(), json!(ok));
        Ok(details)
    }

    async fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Closed(StoreKind::Document));
        }

        tokio::time::timeout(self.close_timeout, self.client.clone().shutdown())
            .await
            .map_err(|_| StoreError::Timeout(self.close_timeout))?;

        tracing::info!("MongoDB client shut down");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        (!self.is_closed()).then(|| self.pool.snapshot(self.max_pool_size))
    }

    fn as_document(&self) -> Option<&Client> {
        (!self.is_closed()).then_some(&self.client)
    }
}

fn record_pool_event(pool: &ConnectionGauge, event: &CmapEvent) {
    match event {
        CmapEvent::ConnectionCreated(_) => pool.opened(),
        CmapEvent::ConnectionClosed(_) => pool.closed(),
        CmapEvent::ConnectionCheckedOut(_) => pool.checked_out(),
        CmapEvent::ConnectionCheckedIn(_) => pool.checked_in(),
        _ => {}
    }
}
