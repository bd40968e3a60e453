use crate::{PostgresConfig, util::connection_error};
use quarry_core::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_postgres::NoTls;

/// One physical connection plus the session state cached for it.
pub(crate) struct PgClient {
    pub(crate) client: tokio_postgres::Client,
    /// Last schema this session's `search_path` was set to, so it is only
    /// re-issued on change.
    pub(crate) search_path: Option<String>,
}

impl PgClient {
    /// Single connect attempt; the retry policy wraps this at pool
    /// establishment only.
    pub(crate) async fn open(config: &PostgresConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(&config.client_config(), NoTls)
            .await
            .map_err(connection_error)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await
                && !e.is_closed()
            {
                log::error!("postgres connection error: {:#}", e);
            }
        });
        Ok(Self {
            client,
            search_path: None,
        })
    }
}

struct PoolInner {
    config: PostgresConfig,
    connections: Mutex<Vec<PgClient>>,
    semaphore: Semaphore,
}

impl PoolInner {
    async fn return_connection(&self, conn: PgClient) {
        let mut connections = self.connections.lock().await;
        if connections.len() < self.config.pool_size && !conn.client.is_closed() {
            connections.push(conn);
        }
        self.semaphore.add_permits(1);
    }
}

/// Pool of physical connections. Independent top-level queries check a
/// handle out, run, and hand it back; a transaction keeps one handle for its
/// whole body.
#[derive(Clone)]
pub(crate) struct PgPool {
    inner: Arc<PoolInner>,
}

impl PgPool {
    /// Establishes the pool with one connection opened eagerly, retrying
    /// that initial connect per the configured policy.
    pub(crate) async fn establish(config: PostgresConfig) -> Result<Self> {
        let policy = config.connect_retry;
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        let first = loop {
            match PgClient::open(&config).await {
                Ok(client) => break client,
                Err(e) if attempt < attempts => {
                    let delay = policy.backoff.delay(attempt);
                    log::warn!(
                        "connect attempt {}/{} failed: {:#}; retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("{:#}", e);
                    return Err(e);
                }
            }
        };
        let semaphore = Semaphore::new(config.pool_size);
        semaphore
            .acquire()
            .await
            .expect("freshly built semaphore is never closed")
            .forget();
        let inner = Arc::new(PoolInner {
            config,
            connections: Mutex::new(vec![first]),
            semaphore,
        });
        Ok(Self { inner })
    }

    /// Checks a connection out, waiting when every slot is busy. The handle
    /// rejoins the pool when dropped, whatever the exit path.
    pub(crate) async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .semaphore
            .acquire()
            .await
            .map_err(|_| quarry_core::QuarryError::Connection("pool closed".into()))?;
        permit.forget();
        let mut connections = self.inner.connections.lock().await;
        let conn = match connections.pop() {
            Some(conn) if !conn.client.is_closed() => conn,
            _ => {
                drop(connections);
                match PgClient::open(&self.inner.config).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        self.inner.semaphore.add_permits(1);
                        return Err(e);
                    }
                }
            }
        };
        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
        })
    }
}

/// A checked-out connection that returns to the pool on drop.
pub(crate) struct PooledConnection {
    conn: Option<PgClient>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    pub(crate) fn client(&self) -> &tokio_postgres::Client {
        &self
            .conn
            .as_ref()
            .expect("connection is present until dropped")
            .client
    }

    pub(crate) fn search_path(&self) -> Option<&str> {
        self.conn
            .as_ref()
            .expect("connection is present until dropped")
            .search_path
            .as_deref()
    }

    pub(crate) fn set_search_path(&mut self, schema: String) {
        if let Some(conn) = self.conn.as_mut() {
            conn.search_path = Some(schema);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.return_connection(conn).await;
            });
        }
    }
}
