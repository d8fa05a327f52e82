use serde::{Deserialize, Serialize};

/// Where the reader is in the document. Pages are numbered from 1.
///
/// The page-turn count is owned by the music controller, which resets it;
/// `ReaderSnapshot::page_turn_count` reports it alongside the cursor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub page_number: u32,
    pub total_pages: u32,
}

impl PageCursor {
    pub fn new(total_pages: u32) -> Self {
        Self {
            page_number: 1,
            total_pages: total_pages.max(1),
        }
    }

    pub fn is_last(&self) -> bool {
        self.page_number >= self.total_pages
    }

    pub fn next_page(&self) -> Option<u32> {
        (!self.is_last()).then_some(self.page_number + 1)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.page_number > 1).then(|| self.page_number - 1)
    }

    pub fn contains(&self, page: u32) -> bool {
        (1..=self.total_pages).contains(&page)
    }
}
