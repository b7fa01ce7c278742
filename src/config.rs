//! Driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the migration driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Identifier of the local controller node.
    pub node_id: i32,

    /// Interval between self-scheduled poll events.
    pub poll_interval: Duration,

    /// Upper bound on waiting for the metadata log to commit a migration
    /// batch or to finish the migration. Large enough to avoid timeouts in
    /// the common case while still preventing an indefinite block.
    pub metadata_commit_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            poll_interval: Duration::from_secs(1),
            metadata_commit_timeout: Duration::from_secs(300),
        }
    }
}
