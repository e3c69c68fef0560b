//! View state for the shopping list
//!
//! [`ShoppingViewModel`] owns the search text and two live item sequences:
//! `items`, filtered by the search text, and `all_items`, unfiltered. Both run
//! their store queries only while observed.
//!
//! Mutations are fire-and-forget. They go onto the store's writer queue and
//! return immediately; the live sequences pick up the result once the write
//! lands. Store errors are logged here and never reach the caller.

use crate::live::{LiveValue, Observable, SharingPolicy};
use crate::query::LiveQuery;
use crate::share::{self, ShareFormat};
use crate::store::{ItemQuery, ItemStore, NewItem, ShoppingItem, Write};
use serde::Serialize;
use std::sync::Arc;

/// Counts derived from the unfiltered list
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ListSummary {
    pub total: usize,
    pub completed: usize,
    /// completed / total, or 0 for an empty list
    pub progress: f32,
}

impl ListSummary {
    pub fn from_items(items: &[ShoppingItem]) -> Self {
        let total = items.len();
        let completed = items.iter().filter(|item| item.is_checked).count();
        let progress = if total == 0 {
            0.0
        } else {
            completed as f32 / total as f32
        };
        Self {
            total,
            completed,
            progress,
        }
    }
}

/// Parse quantity text, falling back to 1
///
/// Only a bare integer with an optional sign parses. Surrounding spaces or
/// a decimal point fall back to 1. No range check beyond `i32`.
pub fn parse_quantity(text: &str) -> i32 {
    text.parse().unwrap_or(1)
}

pub struct ShoppingViewModel {
    store: Arc<ItemStore>,
    search_text: Observable<String>,
    filter: Arc<LiveQuery>,
    items: LiveValue<Vec<ShoppingItem>>,
    all_items: LiveValue<Vec<ShoppingItem>>,
}

impl ShoppingViewModel {
    /// Build the view model. Must be called from within a tokio runtime.
    pub fn new(store: Arc<ItemStore>, policy: SharingPolicy) -> anyhow::Result<Self> {
        let filter = Arc::new(LiveQuery::matching(store.clone(), ""));
        let everything = Arc::new(LiveQuery::all(store.clone()));

        let items = LiveValue::new("items", Vec::new(), policy, filter.upstream())?;
        let all_items = LiveValue::new("all_items", Vec::new(), policy, everything.upstream())?;

        Ok(Self {
            store,
            search_text: Observable::new(String::new()),
            filter,
            items,
            all_items,
        })
    }

    pub fn search_text(&self) -> &Observable<String> {
        &self.search_text
    }

    /// Items whose name contains the search text, unchecked first, newest
    /// first within each group
    pub fn items(&self) -> &LiveValue<Vec<ShoppingItem>> {
        &self.items
    }

    /// Every item, by ascending id
    pub fn all_items(&self) -> &LiveValue<Vec<ShoppingItem>> {
        &self.all_items
    }

    pub fn set_search_text(&self, text: &str) {
        self.search_text.set(text.to_string());
        if self.filter.set_query(ItemQuery::Matching(text.to_string())) {
            tracing::trace!(
                "Search text now {:?} (generation {})",
                text,
                self.filter.generation()
            );
        }
    }

    /// Add an unchecked item. Ignored when either field is blank.
    pub fn add_item(&self, name: &str, quantity_text: &str) {
        if name.trim().is_empty() || quantity_text.trim().is_empty() {
            tracing::debug!(
                "Ignoring add with blank field (name {:?}, quantity {:?})",
                name,
                quantity_text
            );
            return;
        }
        let quantity = parse_quantity(quantity_text);
        self.submit(Write::Insert(NewItem::new(name, quantity)));
    }

    /// Replace the stored row with the same id
    pub fn update_item(&self, item: &ShoppingItem) {
        self.submit(Write::Update(item.clone()));
    }

    pub fn delete_item(&self, item: &ShoppingItem) {
        self.submit(Write::Delete(item.id));
    }

    pub fn delete_all_items(&self) {
        self.submit(Write::DeleteAll);
    }

    fn submit(&self, write: Write) {
        if let Err(e) = self.store.enqueue(write) {
            tracing::warn!("Dropped write: {:#}", e);
        }
    }

    /// Totals over the last known unfiltered list
    pub fn summary(&self) -> ListSummary {
        ListSummary::from_items(&self.all_items.get())
    }

    /// Export text for the last known unfiltered list
    pub fn share_text(&self, format: &ShareFormat) -> String {
        share::share_text(&self.all_items.get(), format)
    }

    /// Look up the stored row for an id
    pub async fn find_item(&self, id: i64) -> Option<ShoppingItem> {
        match self.store.get(id).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("Failed to look up item {}: {:#}", id, e);
                None
            }
        }
    }

    /// Wait until every mutation issued so far has been applied
    pub async fn flush(&self) {
        if let Err(e) = self.store.flush().await {
            tracing::warn!("Failed to flush item store: {:#}", e);
        }
    }
}
