//! Shared handles to every pipeline component
//!
//! Built once at startup around one backend and cloned into tasks and
//! request handlers.

use std::sync::Arc;

use crate::fanout::{DispatchConfig, FanoutDispatcher, PushChannel};
use crate::ingest::IngestionBatcher;
use crate::query::RangeQueryService;
use crate::sessions::SessionRegistry;
use crate::store::{KeyValueBackend, TimeSeriesStore};

#[derive(Clone)]
pub struct TelemetryContext {
    pub store: TimeSeriesStore,
    pub sessions: SessionRegistry,
    pub ingest: IngestionBatcher,
    pub ranges: RangeQueryService,
}

impl TelemetryContext {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        let store = TimeSeriesStore::new(backend);
        Self {
            sessions: SessionRegistry::new(store.clone()),
            ingest: IngestionBatcher::new(store.clone()),
            ranges: RangeQueryService::new(store.clone()),
            store,
        }
    }

    /// Fan-out dispatcher over this context's sessions
    pub fn dispatcher(&self, channel: Arc<dyn PushChannel>, config: DispatchConfig) -> FanoutDispatcher {
        FanoutDispatcher::with_config(self.sessions.clone(), channel, config)
    }
}
