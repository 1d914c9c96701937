//! Application state shared by every handler.

use std::sync::Arc;

use crate::infra::StoreRegistry;
use crate::services::{AnalyticsService, HealthAggregator};

/// Application state containing the registry and the services reading it.
#[derive(Clone)]
pub struct AppState {
    /// Owner of every live store handle
    pub registry: Arc<StoreRegistry>,
    /// Health prober
    pub health: HealthAggregator,
    /// Primary store statistics
    pub analytics: AnalyticsService,
}

impl AppState {
    pub fn new(registry: Arc<StoreRegistry>, health: HealthAggregator) -> Self {
        let analytics = AnalyticsService::new(registry.clone());
        Self {
            registry,
            health,
            analytics,
        }
    }
}
