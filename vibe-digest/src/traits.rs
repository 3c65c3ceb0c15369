use crate::types::{DigestItem, Result};
use async_trait::async_trait;

/// Something that contributes items to a digest run (a set of feeds, a
/// keyword search, ...).
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Human-readable name for logs
    fn source_name(&self) -> String;

    /// Collect this source's items for the current run
    async fn collect(&self) -> Result<Vec<DigestItem>>;
}
