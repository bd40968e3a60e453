use crate::{
    PostgresConnection, PostgresDriver, ValueHolder,
    connection::apply_search_path,
    pool::PooledConnection,
    util::{labeled, row_labels, statement_error},
};
use async_stream::try_stream;
use postgres_types::ToSql;
use quarry_core::{
    CompiledSql, Driver, Error, Executor, QueryResult, Result, RowLabeled, RowNames,
    RowsAffected, Transaction,
    stream::{Stream, TryStreamExt},
};
use std::{
    pin::pin,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use tokio::sync::{Mutex, MutexGuard};

/// How the transaction is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionMode {
    #[default]
    ReadWrite,
    ReadOnly,
    RepeatableRead,
    Serializable,
}

impl TransactionMode {
    fn begin_sql(&self) -> &'static str {
        match self {
            TransactionMode::ReadWrite => "BEGIN",
            TransactionMode::ReadOnly => "BEGIN READ ONLY",
            TransactionMode::RepeatableRead => "BEGIN ISOLATION LEVEL REPEATABLE READ",
            TransactionMode::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Per-handle FIFO queue serializing savepoint-scoped operations on one
/// physical connection. The queue is the only "connection busy" state; it is
/// fair, so pending operations run in the order they arrived.
pub(crate) struct SerialQueue {
    lock: Mutex<()>,
}

impl SerialQueue {
    fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }

    pub(crate) async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

/// An open transaction pinned to one pooled connection.
///
/// Direct statements run through [`Executor`]; savepoint-scoped statements
/// go through [`savepoint`](Self::savepoint), which concurrent holders of a
/// shared reference may call without corrupting statement order. Dropping an
/// unsettled transaction rolls it back before the handle rejoins the pool.
pub struct PostgresTransaction {
    driver: PostgresDriver,
    handle: Option<PooledConnection>,
    queue: SerialQueue,
    savepoints: Mutex<Vec<String>>,
    counter: AtomicU32,
    settled: AtomicBool,
}

impl PostgresTransaction {
    pub(crate) async fn begin(
        connection: &PostgresConnection,
        mode: TransactionMode,
    ) -> Result<Self> {
        let mut handle = connection.pool.acquire().await?;
        apply_search_path(&mut handle, connection.schema.as_deref()).await?;
        log::debug!("running: {}", mode.begin_sql());
        handle
            .client()
            .batch_execute(mode.begin_sql())
            .await
            .map_err(statement_error)?;
        Ok(Self {
            driver: PostgresDriver::new(connection.driver.compile_options()),
            handle: Some(handle),
            queue: SerialQueue::new(),
            savepoints: Mutex::new(Vec::new()),
            counter: AtomicU32::new(0),
            settled: AtomicBool::new(false),
        })
    }

    fn client(&self) -> &tokio_postgres::Client {
        self.handle
            .as_ref()
            .expect("transaction handle is present until dropped")
            .client()
    }

    /// Runs one statement inside its own savepoint. Callers sharing the
    /// transaction are serialized through the handle queue, so the wire
    /// always sees `SAVEPOINT n; statement; RELEASE n` (or `ROLLBACK TO
    /// SAVEPOINT n` on failure) without interleaving.
    pub async fn savepoint(&self, sql: CompiledSql) -> Result<Vec<RowLabeled>> {
        let _slot = self.queue.acquire().await;
        let name = format!("sp_{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        log::debug!("running: SAVEPOINT \"{}\"", name);
        self.client()
            .batch_execute(&format!("SAVEPOINT \"{}\"", name))
            .await
            .map_err(statement_error)?;
        self.savepoints.lock().await.push(name.clone());
        let result = self.collect_rows(sql).await;
        let frame = match &result {
            Ok(..) => format!("RELEASE SAVEPOINT \"{}\"", name),
            Err(..) => format!("ROLLBACK TO SAVEPOINT \"{}\"", name),
        };
        log::debug!("running: {}", frame);
        if let Err(e) = self.client().batch_execute(&frame).await {
            let e = statement_error(e);
            log::error!("{:#}", e);
            if result.is_ok() {
                self.pop_savepoint(&name).await;
                return Err(e);
            }
        }
        self.pop_savepoint(&name).await;
        result
    }

    async fn pop_savepoint(&self, name: &str) {
        let mut stack = self.savepoints.lock().await;
        debug_assert_eq!(stack.last().map(String::as_str), Some(name));
        stack.pop();
    }

    async fn collect_rows(&self, sql: CompiledSql) -> Result<Vec<RowLabeled>> {
        log::debug!("running: {}", sql);
        let holders: Vec<ValueHolder> = sql.values.iter().cloned().map(ValueHolder).collect();
        let rows = self
            .client()
            .query_raw(sql.text.as_str(), holders.iter().map(|v| v as &dyn ToSql))
            .await
            .map_err(statement_error)?;
        let mut rows = pin!(rows);
        let mut labels: Option<RowNames> = None;
        let mut collected = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(statement_error)? {
            let labels = labels.get_or_insert_with(|| row_labels(&row));
            collected.push(labeled(labels, row)?);
        }
        Ok(collected)
    }

    async fn collect_results(&self, sql: CompiledSql) -> Result<Vec<QueryResult>> {
        log::debug!("running: {}", sql);
        let holders: Vec<ValueHolder> = sql.values.iter().cloned().map(ValueHolder).collect();
        let rows = self
            .client()
            .query_raw(sql.text.as_str(), holders.iter().map(|v| v as &dyn ToSql))
            .await
            .map_err(statement_error)?;
        let mut rows = pin!(rows);
        let mut labels: Option<RowNames> = None;
        let mut collected = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(statement_error)? {
            let labels = labels.get_or_insert_with(|| row_labels(&row));
            collected.push(QueryResult::Row(labeled(labels, row)?));
        }
        collected.push(QueryResult::Affected(RowsAffected {
            rows_affected: rows.rows_affected().unwrap_or(0),
        }));
        Ok(collected)
    }

    /// Rolls the whole transaction back once, before a statement error is
    /// surfaced to the caller.
    async fn rollback_on_error(&self) {
        if self.settled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.client().batch_execute("ROLLBACK").await {
            log::error!("rollback after failed statement also failed: {:#}", e);
        }
    }
}

impl Executor for PostgresTransaction {
    type Driver = PostgresDriver;

    fn driver(&self) -> &Self::Driver {
        &self.driver
    }

    fn run(&mut self, sql: CompiledSql) -> impl Stream<Item = Result<QueryResult>> + Send {
        let this = &*self;
        try_stream! {
            let items = match this.collect_results(sql).await {
                Ok(items) => items,
                Err(e) => {
                    this.rollback_on_error().await;
                    Err(e)?
                }
            };
            for item in items {
                yield item;
            }
        }
    }
}

impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(Error::msg("transaction already settled"));
        }
        log::debug!("running: COMMIT");
        self.client()
            .batch_execute("COMMIT")
            .await
            .map_err(statement_error)
    }

    async fn rollback(self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(Error::msg("transaction already settled"));
        }
        log::debug!("running: ROLLBACK");
        self.client()
            .batch_execute("ROLLBACK")
            .await
            .map_err(statement_error)
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::SeqCst)
            && let Some(handle) = self.handle.take()
        {
            // Roll back asynchronously; the handle rejoins the pool when the
            // task drops it.
            tokio::spawn(async move {
                if let Err(e) = handle.client().batch_execute("ROLLBACK").await {
                    log::error!("rollback of dropped transaction failed: {:#}", e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    #[test]
    fn transaction_modes_render_begin_sql() {
        assert_eq!(TransactionMode::ReadWrite.begin_sql(), "BEGIN");
        assert_eq!(TransactionMode::ReadOnly.begin_sql(), "BEGIN READ ONLY");
        assert_eq!(
            TransactionMode::Serializable.begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE"
        );
    }

    #[tokio::test]
    async fn serial_queue_runs_pending_operations_in_arrival_order() {
        let queue = Arc::new(SerialQueue::new());
        let log: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let blocker = queue.acquire().await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = queue.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let _slot = queue.acquire().await;
                log.lock().await.push(i);
            }));
            // Give each task time to enqueue before the next one arrives.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        drop(blocker);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*log.lock().await, vec![0, 1, 2]);
    }
}
