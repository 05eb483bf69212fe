use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Read access to the application's settings service
#[async_trait::async_trait]
pub trait Settings: Send + Sync {
    /// Value for `category`/`key`, or `default` when unset or unavailable
    async fn get_setting(&self, category: &str, key: &str, default: Option<&str>) -> Option<String>;
}

/// Settings held in a map, for tests and file-driven configuration
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, category: &str, key: &str, value: impl Into<String>) -> Self {
        self.set(category, key, value);
        self
    }

    pub fn set(&self, category: &str, key: &str, value: impl Into<String>) {
        self.values
            .write()
            .insert((category.to_string(), key.to_string()), value.into());
    }
}

#[async_trait::async_trait]
impl Settings for StaticSettings {
    async fn get_setting(&self, category: &str, key: &str, default: Option<&str>) -> Option<String> {
        self.values
            .read()
            .get(&(category.to_string(), key.to_string()))
            .cloned()
            .or_else(|| default.map(str::to_string))
    }
}
