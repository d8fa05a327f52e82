use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;

use super::DocumentProvider;

const PAGE_BREAK: char = '\u{c}';

/// Plain text held in memory, one string per page.
#[derive(Debug, Clone)]
pub struct TextDocument {
    pages: Vec<String>,
}

impl TextDocument {
    pub fn from_pages<I, S>(pages: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages: Vec<String> = pages.into_iter().map(Into::into).collect();
        if pages.is_empty() {
            bail!("document has no pages");
        }
        Ok(Self { pages })
    }

    /// Split on form feeds; surrounding whitespace of each page is trimmed.
    pub fn parse(contents: &str) -> Result<Self> {
        Self::from_pages(contents.split(PAGE_BREAK).map(str::trim))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read document from {}", path.display()))?;
        Self::parse(&contents)
    }
}

#[async_trait]
impl DocumentProvider for TextDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn page_text(&self, page: u32) -> Result<String> {
        let index = page
            .checked_sub(1)
            .with_context(|| format!("page {page} is out of range"))?;
        self.pages
            .get(index as usize)
            .cloned()
            .with_context(|| format!("page {page} is out of range (document has {})", self.pages.len()))
    }
}
