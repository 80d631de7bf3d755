use chrono::{DateTime, Utc};

use crate::domain::Item;

/// The parsed content of one feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Channel {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Format label, e.g. `RSS 2.0` or `Atom`.
    pub format: String,
    items: Vec<Item>,
}

impl Channel {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Self::default()
        }
    }

    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items;
        self
    }

    /// Independent copy of the item list.
    ///
    /// Callers iterate the snapshot and may remove items from the channel
    /// while doing so.
    pub fn snapshot_items(&self) -> Vec<Item> {
        self.items.clone()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    pub fn set_items(&mut self, items: Vec<Item>) {
        self.items = items;
    }

    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Remove every item with the given cache key. Returns how many went.
    pub fn remove_item(&mut self, cache_key: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.cache_key() != cache_key);
        before - self.items.len()
    }

    pub fn retain_items<F: FnMut(&Item) -> bool>(&mut self, f: F) {
        self.items.retain(f);
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Deep copy handed to each output sink so their edits stay private.
    pub fn make_copy(&self) -> Channel {
        self.clone()
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.link.as_deref())
            .unwrap_or("(Untitled feed)")
    }
}
