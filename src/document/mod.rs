pub mod text;

use anyhow::Result;
use async_trait::async_trait;

pub use text::TextDocument;

/// Page source for the reader. Pages are numbered from 1.
#[async_trait]
pub trait DocumentProvider: Send + Sync {
    fn page_count(&self) -> u32;

    async fn page_text(&self, page: u32) -> Result<String>;
}
