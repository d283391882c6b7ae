use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use vigil_queue::Broker;
use vigil_storage::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub broker: Arc<dyn Broker>,
    pub config: Arc<ServerConfig>,
    /// Bearer key to org id.
    pub api_keys: Arc<HashMap<String, String>>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Store, broker: Arc<dyn Broker>, config: ServerConfig) -> Self {
        let api_keys = config
            .api
            .keys
            .iter()
            .map(|k| (k.key.clone(), k.org_id.clone()))
            .collect();
        Self {
            store,
            broker,
            config: Arc::new(config),
            api_keys: Arc::new(api_keys),
            start_time: Utc::now(),
        }
    }
}
