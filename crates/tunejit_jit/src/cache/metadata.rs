use serde::{Deserialize, Serialize};

use super::key::SpecializationKey;

/// Sidecar describing one cached module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub key: SpecializationKey,
    pub compiled_at: u64,
    pub size: usize,
}

impl CacheMetadata {
    pub fn new(key: &SpecializationKey, size: usize) -> Self {
        Self {
            key: key.clone(),
            size,
            compiled_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_secs()),
        }
    }

    pub fn function_name(&self) -> &str {
        &self.key.function_name
    }

    /// Whether this entry was stored for exactly `key`. File stems are only a
    /// digest, so the full key is compared.
    pub fn is_valid(&self, key: &SpecializationKey) -> bool {
        self.key == *key
    }
}
