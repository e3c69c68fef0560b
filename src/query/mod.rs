//! Live queries over the item store
//!
//! A [`LiveQuery`] turns a store query into an upstream for a
//! [`LiveValue`](crate::live::LiveValue). While running it re-fetches the
//! full result whenever the store revision moves or the filter changes, and
//! publishes complete snapshots.
//!
//! # Filter switching
//!
//! Every filter change bumps a generation number that travels with the
//! filter. A fetch is tagged with the generation it was started for, and its
//! result is published only if that generation is still current. A fetch
//! still in flight when the filter changes is dropped.
//!
//! The generation check and the publish happen under a read borrow of the
//! request channel, so [`LiveQuery::set_query`] waits for an in-progress
//! publish to finish. Observers of a live query must therefore not change
//! that query's filter from inside their callback.

use crate::live::{Publisher, Upstream};
use crate::store::{ItemQuery, ItemStore, ShoppingItem};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tokio::sync::watch;

/// Where a live query reads from
pub trait ItemSource: Send + Sync {
    fn fetch_items(&self, query: ItemQuery) -> BoxFuture<'_, anyhow::Result<Vec<ShoppingItem>>>;

    /// Counter that moves after every effective write
    fn revisions(&self) -> watch::Receiver<u64>;
}

impl ItemSource for ItemStore {
    fn fetch_items(&self, query: ItemQuery) -> BoxFuture<'_, anyhow::Result<Vec<ShoppingItem>>> {
        ItemStore::fetch(self, query).boxed()
    }

    fn revisions(&self) -> watch::Receiver<u64> {
        ItemStore::revisions(self)
    }
}

/// The query a live query should currently run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub generation: u64,
    pub query: ItemQuery,
}

/// What happened to a finished fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Published,
    /// The filter moved on while the fetch ran
    Stale,
    /// The live value is gone
    Closed,
}

/// A store query that stays up to date
pub struct LiveQuery {
    name: &'static str,
    source: Arc<dyn ItemSource>,
    request: watch::Sender<QueryRequest>,
}

impl LiveQuery {
    pub fn new(name: &'static str, source: Arc<dyn ItemSource>, query: ItemQuery) -> Self {
        let (request, _) = watch::channel(QueryRequest {
            generation: 0,
            query,
        });
        Self {
            name,
            source,
            request,
        }
    }

    /// Every row in the store
    pub fn all(store: Arc<ItemStore>) -> Self {
        Self::new("all_items", store, ItemQuery::All)
    }

    /// Rows whose name contains `filter`
    pub fn matching(store: Arc<ItemStore>, filter: &str) -> Self {
        Self::new("items", store, ItemQuery::Matching(filter.to_string()))
    }

    /// Switch to a new query. Returns false (and keeps the generation) if it
    /// equals the current one.
    pub fn set_query(&self, query: ItemQuery) -> bool {
        self.request.send_if_modified(|current| {
            if current.query == query {
                return false;
            }
            current.generation += 1;
            current.query = query;
            true
        })
    }

    pub fn generation(&self) -> u64 {
        self.request.borrow().generation
    }

    /// Upstream factory for a live value
    pub fn upstream(self: &Arc<Self>) -> Upstream<Vec<ShoppingItem>> {
        let query = self.clone();
        Arc::new(move |publisher: Publisher<Vec<ShoppingItem>>| {
            let query = query.clone();
            async move { query.drive(publisher).await }.boxed()
        })
    }

    /// Publish `items` if `generation` is still the current one
    ///
    /// The request borrow is held across the publish so a concurrent
    /// `set_query` lands either before the check or after the new value.
    fn deliver(
        &self,
        publisher: &Publisher<Vec<ShoppingItem>>,
        generation: u64,
        items: Vec<ShoppingItem>,
    ) -> Delivery {
        let current = self.request.borrow();
        if current.generation != generation {
            return Delivery::Stale;
        }
        if publisher.publish(items) {
            Delivery::Published
        } else {
            Delivery::Closed
        }
    }

    async fn drive(&self, publisher: Publisher<Vec<ShoppingItem>>) {
        let mut requests = self.request.subscribe();
        let mut revisions = self.source.revisions();

        loop {
            let request = requests.borrow_and_update().clone();
            let _ = revisions.borrow_and_update();

            let fetch = self.source.fetch_items(request.query.clone());
            tokio::pin!(fetch);

            // A finished fetch wins over a filter change that became ready
            // in the same poll; `deliver` then rejects it as stale
            let result = tokio::select! {
                biased;
                result = &mut fetch => Some(result),
                changed = requests.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    None
                }
            };

            match result {
                None => {
                    tracing::trace!(
                        "{}: generation {} superseded before its result arrived",
                        self.name,
                        request.generation
                    );
                    continue;
                }
                Some(Ok(items)) => match self.deliver(&publisher, request.generation, items) {
                    Delivery::Published => {}
                    Delivery::Stale => {
                        tracing::trace!(
                            "{}: discarding stale result for generation {}",
                            self.name,
                            request.generation
                        );
                        continue;
                    }
                    Delivery::Closed => return,
                },
                Some(Err(e)) => {
                    // Keep the last good result and try again on the next change
                    tracing::warn!("{}: query failed: {:#}", self.name, e);
                }
            }

            tokio::select! {
                changed = requests.changed() => if changed.is_err() { return },
                changed = revisions.changed() => if changed.is_err() { return },
            }
        }
    }
}
