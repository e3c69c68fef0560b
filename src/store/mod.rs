//! Shopping list storage
//!
//! Items live in a single SQLite table. Writes go through one dedicated
//! writer thread so they are applied strictly in submission order; reads go
//! through a small connection pool and run on the tokio blocking pool.
//!
//! # Architecture
//!
//! ```text
//! ShoppingViewModel / CLI
//!     │
//!     ├──→ ItemStore::enqueue() / insert() / update() ...
//!     │       │
//!     │       └──→ std::sync::mpsc::SyncSender (bounded FIFO)
//!     │               │
//!     │               └──→ Dedicated Writer Thread ──→ SQLite (WAL mode)
//!     │                       │
//!     │                       └──→ revision += 1 (tokio watch)
//!     │
//!     └──→ ItemStore::fetch() ──→ r2d2 reader pool (spawn_blocking)
//! ```
//!
//! # Backpressure
//!
//! The writer queue holds at most `channel_buffer` commands. When it is full,
//! submitting blocks the caller until the writer catches up. Writes are
//! never dropped.
//!
//! # WAL Mode Concurrency
//!
//! The writer commits each write as its own statement. Pooled readers see
//! either the state before a write or after it, never a partial row.

pub mod models;
pub mod schema;

pub use models::{ItemQuery, NewItem, ShoppingItem};

use anyhow::{anyhow, Context};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

const SELECT_ALL: &str = "SELECT id, name, quantity, is_checked FROM shopping_items ORDER BY id ASC";

const SELECT_MATCHING: &str = r#"
    SELECT id, name, quantity, is_checked
    FROM shopping_items
    WHERE ?1 = '' OR instr(name, ?1) > 0
    ORDER BY is_checked ASC, id DESC
"#;

const SELECT_BY_ID: &str = "SELECT id, name, quantity, is_checked FROM shopping_items WHERE id = ?1";

/// Configuration for the item store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Maximum number of pooled reader connections
    pub reader_pool_size: u32,
    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,
    /// Capacity of the writer queue
    pub channel_buffer: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/shopping.db"),
            reader_pool_size: 4,
            busy_timeout_ms: 5000,
            channel_buffer: 1024,
        }
    }
}

/// A single mutation of the items table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    /// Insert a new row; silently ignored on a uniqueness conflict
    Insert(NewItem),
    /// Replace the row with the same id; no-op when the id is unknown
    Update(ShoppingItem),
    /// Remove the row with this id; no-op when the id is unknown
    Delete(i64),
    /// Remove every row
    DeleteAll,
    /// Remove every checked row
    DeleteCompleted,
}

impl Write {
    fn kind(&self) -> &'static str {
        match self {
            Write::Insert(_) => "insert",
            Write::Update(_) => "update",
            Write::Delete(_) => "delete",
            Write::DeleteAll => "delete_all",
            Write::DeleteCompleted => "delete_completed",
        }
    }
}

/// What a write did to the table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_affected: usize,
    /// Id assigned by an insert that was not ignored
    pub inserted_id: Option<i64>,
}

/// Counters for the writer thread
#[derive(Debug, Default)]
pub struct StoreMetrics {
    /// Writes that changed at least one row
    pub writes_applied: AtomicU64,
    /// Writes that matched nothing (unknown id, insert conflict, empty table)
    pub writes_noop: AtomicU64,
    /// Writes that failed with a database error
    pub writes_failed: AtomicU64,
}

impl StoreMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            writes_noop: self.writes_noop.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub writes_applied: u64,
    pub writes_noop: u64,
    pub writes_failed: u64,
}

type Reply = oneshot::Sender<anyhow::Result<WriteOutcome>>;

/// Commands sent to the writer thread
enum WriterCommand {
    Apply { write: Write, reply: Option<Reply> },
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

/// Persistent shopping list table
///
/// Construct once at startup and share it behind an `Arc`.
pub struct ItemStore {
    /// Channel to the writer thread
    tx: SyncSender<WriterCommand>,
    /// Handle to writer thread (for join on shutdown)
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    /// Reader connections
    pool: Pool<SqliteConnectionManager>,
    /// Bumped after every write that changed rows
    revisions: Arc<watch::Sender<u64>>,
    metrics: Arc<StoreMetrics>,
}

impl ItemStore {
    /// Open (or create) the database and start the writer thread
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened, the schema
    /// cannot be set up, or the reader pool cannot connect.
    pub fn open(config: StoreConfig) -> anyhow::Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(&config.db_path)
            .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
        schema::init_schema(&conn, config.busy_timeout_ms)?;

        // Schema exists before any reader connects
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(&config.db_path)
            .with_init(move |c| c.busy_timeout(busy_timeout));
        let pool = Pool::builder()
            .max_size(config.reader_pool_size.max(1))
            .build(manager)
            .context("Failed to build reader pool")?;

        let (tx, rx) = mpsc::sync_channel::<WriterCommand>(config.channel_buffer.max(1));
        let (revision_tx, _) = watch::channel(0u64);
        let revisions = Arc::new(revision_tx);
        let metrics = Arc::new(StoreMetrics::default());

        let writer_revisions = revisions.clone();
        let writer_metrics = metrics.clone();
        let writer_handle = thread::Builder::new()
            .name("item-store-writer".into())
            .spawn(move || Self::writer_thread(conn, rx, writer_revisions, writer_metrics))
            .context("Failed to spawn item store writer thread")?;

        tracing::debug!("Item store opened at {}", config.db_path.display());

        Ok(Self {
            tx,
            writer_handle: Mutex::new(Some(writer_handle)),
            pool,
            revisions,
            metrics,
        })
    }

    /// Receiver for the revision counter, bumped after each effective write
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Submit a write without waiting for it
    ///
    /// Writes submitted in sequence are applied in that sequence. Failures
    /// are logged and counted by the writer thread. Blocks while the writer
    /// queue is full.
    pub fn enqueue(&self, write: Write) -> anyhow::Result<()> {
        self.send(WriterCommand::Apply { write, reply: None })
    }

    /// Insert a row, returning its id, or `None` if the insert was ignored
    #[allow(dead_code)] // Awaitable form, used in tests
    pub async fn insert(&self, item: NewItem) -> anyhow::Result<Option<i64>> {
        Ok(self.request(Write::Insert(item)).await?.inserted_id)
    }

    /// Replace the row with `item.id`. Returns false if no such row exists.
    #[allow(dead_code)] // Awaitable form, used in tests
    pub async fn update(&self, item: &ShoppingItem) -> anyhow::Result<bool> {
        let outcome = self.request(Write::Update(item.clone())).await?;
        Ok(outcome.rows_affected > 0)
    }

    /// Remove the row with `item.id`. Returns false if no such row exists.
    #[allow(dead_code)] // Awaitable form, used in tests
    pub async fn delete(&self, item: &ShoppingItem) -> anyhow::Result<bool> {
        let outcome = self.request(Write::Delete(item.id)).await?;
        Ok(outcome.rows_affected > 0)
    }

    /// Remove every row, returning how many were removed
    #[allow(dead_code)] // Awaitable form, used in tests
    pub async fn delete_all(&self) -> anyhow::Result<usize> {
        Ok(self.request(Write::DeleteAll).await?.rows_affected)
    }

    /// Remove every checked row, returning how many were removed
    ///
    /// Not used by the view model; kept as part of the store surface.
    #[allow(dead_code)]
    pub async fn delete_completed(&self) -> anyhow::Result<usize> {
        Ok(self.request(Write::DeleteCompleted).await?.rows_affected)
    }

    /// Wait until every write submitted before this call has been applied
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(WriterCommand::Barrier(done_tx))?;
        done_rx.await.context("Item store writer stopped before flush")
    }

    async fn request(&self, write: Write) -> anyhow::Result<WriteOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(WriterCommand::Apply {
            write,
            reply: Some(reply_tx),
        })?;
        reply_rx
            .await
            .context("Item store writer stopped before replying")?
    }

    fn send(&self, command: WriterCommand) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| anyhow!("Item store writer has shut down"))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Run a read query on the blocking pool
    pub async fn fetch(&self, query: ItemQuery) -> anyhow::Result<Vec<ShoppingItem>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || Self::read_items(&pool, &query))
            .await
            .context("Item query task failed")?
    }

    /// Every row, by ascending id
    #[allow(dead_code)] // Awaitable form, used in tests
    pub async fn query_all(&self) -> anyhow::Result<Vec<ShoppingItem>> {
        self.fetch(ItemQuery::All).await
    }

    /// Rows whose name contains `search_text` (case-sensitive), unchecked
    /// first, newest first within each group
    #[allow(dead_code)] // Awaitable form, used in tests
    pub async fn query_filtered(&self, search_text: &str) -> anyhow::Result<Vec<ShoppingItem>> {
        self.fetch(ItemQuery::Matching(search_text.to_string()))
            .await
    }

    /// Look up a single row by id
    pub async fn get(&self, id: i64) -> anyhow::Result<Option<ShoppingItem>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let item = conn
                .query_row(SELECT_BY_ID, params![id], ShoppingItem::from_row)
                .optional()?;
            Ok::<_, anyhow::Error>(item)
        })
        .await
        .context("Item lookup task failed")?
    }

    fn read_items(
        pool: &Pool<SqliteConnectionManager>,
        query: &ItemQuery,
    ) -> anyhow::Result<Vec<ShoppingItem>> {
        let conn = pool.get()?;

        let items = match query {
            ItemQuery::All => {
                let mut stmt = conn.prepare_cached(SELECT_ALL)?;
                let rows = stmt.query_map([], ShoppingItem::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            ItemQuery::Matching(text) => {
                let mut stmt = conn.prepare_cached(SELECT_MATCHING)?;
                let rows = stmt.query_map(params![text], ShoppingItem::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(items)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writer thread
    // ─────────────────────────────────────────────────────────────────────

    fn writer_thread(
        conn: Connection,
        rx: Receiver<WriterCommand>,
        revisions: Arc<watch::Sender<u64>>,
        metrics: Arc<StoreMetrics>,
    ) {
        while let Ok(command) = rx.recv() {
            match command {
                WriterCommand::Apply { write, reply } => {
                    let result = Self::apply_write(&conn, &write);
                    match &result {
                        Ok(outcome) if outcome.rows_affected > 0 => {
                            metrics.writes_applied.fetch_add(1, Ordering::Relaxed);
                            revisions.send_modify(|revision| *revision += 1);
                            tracing::trace!(
                                "Applied {} ({} rows)",
                                write.kind(),
                                outcome.rows_affected
                            );
                        }
                        Ok(_) => {
                            metrics.writes_noop.fetch_add(1, Ordering::Relaxed);
                            tracing::trace!("{} matched no rows", write.kind());
                        }
                        Err(e) => {
                            // Log but keep serving later writes
                            metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!("Failed to apply {}: {:#}", write.kind(), e);
                        }
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                WriterCommand::Barrier(done) => {
                    let _ = done.send(());
                }
                WriterCommand::Shutdown => {
                    tracing::debug!("Item store writer thread shutting down");
                    break;
                }
            }
        }
    }

    fn apply_write(conn: &Connection, write: &Write) -> anyhow::Result<WriteOutcome> {
        let outcome = match write {
            Write::Insert(item) => {
                let rows = conn.execute(
                    "INSERT OR IGNORE INTO shopping_items (name, quantity, is_checked)
                     VALUES (?1, ?2, ?3)",
                    params![item.name, item.quantity, item.is_checked],
                )?;
                WriteOutcome {
                    rows_affected: rows,
                    inserted_id: (rows > 0).then(|| conn.last_insert_rowid()),
                }
            }
            Write::Update(item) => {
                let rows = conn.execute(
                    "UPDATE shopping_items SET name = ?2, quantity = ?3, is_checked = ?4
                     WHERE id = ?1",
                    params![item.id, item.name, item.quantity, item.is_checked],
                )?;
                WriteOutcome {
                    rows_affected: rows,
                    inserted_id: None,
                }
            }
            Write::Delete(id) => {
                let rows = conn.execute("DELETE FROM shopping_items WHERE id = ?1", params![id])?;
                WriteOutcome {
                    rows_affected: rows,
                    inserted_id: None,
                }
            }
            Write::DeleteAll => {
                let rows = conn.execute("DELETE FROM shopping_items", [])?;
                WriteOutcome {
                    rows_affected: rows,
                    inserted_id: None,
                }
            }
            Write::DeleteCompleted => {
                let rows = conn.execute("DELETE FROM shopping_items WHERE is_checked = 1", [])?;
                WriteOutcome {
                    rows_affected: rows,
                    inserted_id: None,
                }
            }
        };
        Ok(outcome)
    }

    /// Drain pending writes and stop the writer thread
    pub fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown);

        let handle = self
            .writer_handle
            .lock()
            .ok()
            .and_then(|mut handle| handle.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Item store writer thread panicked");
            }
            let metrics = self.metrics();
            tracing::debug!(
                "Item store closed ({} applied, {} no-op, {} failed)",
                metrics.writes_applied,
                metrics.writes_noop,
                metrics.writes_failed
            );
        }
    }
}

impl Drop for ItemStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> ItemStore {
        ItemStore::open(StoreConfig {
            db_path: dir.path().join("shopping.db"),
            ..StoreConfig::default()
        })
        .unwrap()
    }

    fn names(items: &[ShoppingItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let first = store.insert(NewItem::new("Milk", 2)).await.unwrap().unwrap();
        let second = store.insert(NewItem::new("Eggs", 6)).await.unwrap().unwrap();
        assert!(second > first);

        let milk = store.get(first).await.unwrap().unwrap();
        assert_eq!(milk.name, "Milk");
        assert_eq!(milk.quantity, 2);
        assert!(!milk.is_checked);
    }

    #[tokio::test]
    async fn test_filtered_query_orders_unchecked_first_then_newest() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let apples = store.insert(NewItem::new("Apples", 1)).await.unwrap().unwrap();
        store.insert(NewItem::new("Bananas", 1)).await.unwrap();
        store.insert(NewItem::new("Cherries", 1)).await.unwrap();

        let apples = store.get(apples).await.unwrap().unwrap();
        store.update(&apples.with_checked(true)).await.unwrap();
        let dates = store.insert(NewItem::new("Dates", 1)).await.unwrap().unwrap();
        let dates = store.get(dates).await.unwrap().unwrap();
        store.update(&dates.with_checked(true)).await.unwrap();

        let items = store.query_filtered("").await.unwrap();
        assert_eq!(names(&items), vec!["Cherries", "Bananas", "Dates", "Apples"]);
    }

    #[tokio::test]
    async fn test_filtered_query_is_case_sensitive_substring() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.insert(NewItem::new("Eggs", 1)).await.unwrap();
        store.insert(NewItem::new("Red peppers", 2)).await.unwrap();

        assert!(store.query_filtered("egg").await.unwrap().is_empty());
        assert_eq!(names(&store.query_filtered("Egg").await.unwrap()), vec!["Eggs"]);
        assert_eq!(
            names(&store.query_filtered("pepper").await.unwrap()),
            vec!["Red peppers"]
        );
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_id_are_noops() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let ghost = ShoppingItem {
            id: 999,
            name: "Ghost".to_string(),
            quantity: 1,
            is_checked: false,
        };
        assert!(!store.update(&ghost).await.unwrap());
        assert!(!store.delete(&ghost).await.unwrap());
        assert!(store.query_all().await.unwrap().is_empty());
        assert_eq!(store.metrics().writes_noop, 2);
    }

    #[tokio::test]
    async fn test_delete_all_twice_leaves_store_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.insert(NewItem::new("Milk", 2)).await.unwrap();
        store.insert(NewItem::new("Bread", 1)).await.unwrap();

        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert!(store.query_all().await.unwrap().is_empty());
        assert_eq!(store.delete_all().await.unwrap(), 0);
        assert!(store.query_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_completed_removes_only_checked_rows() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let milk = store.insert(NewItem::new("Milk", 2)).await.unwrap().unwrap();
        store.insert(NewItem::new("Bread", 1)).await.unwrap();
        let milk = store.get(milk).await.unwrap().unwrap();
        store.update(&milk.with_checked(true)).await.unwrap();

        assert_eq!(store.delete_completed().await.unwrap(), 1);
        assert_eq!(names(&store.query_all().await.unwrap()), vec!["Bread"]);
    }

    #[tokio::test]
    async fn test_enqueued_writes_apply_in_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.enqueue(Write::Insert(NewItem::new("Milk", 1))).unwrap();
        store.enqueue(Write::DeleteAll).unwrap();
        store.enqueue(Write::Insert(NewItem::new("Bread", 1))).unwrap();
        store.flush().await.unwrap();

        assert_eq!(names(&store.query_all().await.unwrap()), vec!["Bread"]);
    }

    #[tokio::test]
    async fn test_full_writer_queue_blocks_instead_of_dropping() {
        let dir = TempDir::new().unwrap();
        let store = ItemStore::open(StoreConfig {
            db_path: dir.path().join("shopping.db"),
            channel_buffer: 1,
            ..StoreConfig::default()
        })
        .unwrap();

        let expected: Vec<String> = (0..50).map(|n| format!("Item {}", n)).collect();
        for name in &expected {
            store
                .enqueue(Write::Insert(NewItem::new(name.as_str(), 1)))
                .unwrap();
        }
        store.flush().await.unwrap();

        let items = store.query_all().await.unwrap();
        assert_eq!(names(&items), expected);
        assert_eq!(store.metrics().writes_applied, 50);
    }

    #[tokio::test]
    async fn test_revision_bumps_only_on_effective_writes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let revisions = store.revisions();
        let start = *revisions.borrow();

        store.delete_all().await.unwrap();
        assert_eq!(*revisions.borrow(), start);

        store.insert(NewItem::new("Milk", 1)).await.unwrap();
        assert_eq!(*revisions.borrow(), start + 1);
    }

    #[tokio::test]
    async fn test_items_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.insert(NewItem::new("Milk", 2)).await.unwrap();
            store.shutdown();
        }

        let store = open_store(&dir);
        let items = store.query_all().await.unwrap();
        assert_eq!(names(&items), vec!["Milk"]);
        assert_eq!(items[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_writer() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let raw = Connection::open(dir.path().join("shopping.db")).unwrap();
        raw.execute("DROP TABLE shopping_items", []).unwrap();

        assert!(store.insert(NewItem::new("Milk", 1)).await.is_err());
        assert_eq!(store.metrics().writes_failed, 1);

        raw.execute_batch(
            "CREATE TABLE shopping_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                is_checked INTEGER NOT NULL DEFAULT 0
            );",
        )
        .unwrap();

        assert!(store.insert(NewItem::new("Bread", 1)).await.unwrap().is_some());
        assert_eq!(names(&store.query_all().await.unwrap()), vec!["Bread"]);
    }
}
