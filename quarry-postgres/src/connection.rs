use crate::{
    PostgresConfig, PostgresDriver, PostgresTransaction, TransactionMode, ValueHolder,
    pool::{PgPool, PooledConnection},
    util::{labeled, row_labels, statement_error},
};
use async_stream::try_stream;
use postgres_types::ToSql;
use quarry_core::{
    Compiled, CompiledSql, Connection, DeleteDescriptor, Driver, Executor, InsertDescriptor,
    QueryDescriptor, QueryOutput, QueryResult, Result, Row, RowLabeled, RowNames, RowsAffected,
    SqlWriter, UpdateDescriptor, compile_delete, compile_insert, compile_or_create,
    compile_select, compile_update, compile_upsert, fetch_arrays, fetch_output, run_or_create,
    run_upsert,
    stream::{Stream, TryStreamExt},
};
use std::pin::pin;

/// Pool-backed entry point. Independent top-level statements run on any
/// pooled connection; transactions pin one handle for their whole body.
pub struct PostgresConnection {
    pub(crate) driver: PostgresDriver,
    pub(crate) pool: PgPool,
    pub(crate) schema: Option<String>,
}

impl PostgresConnection {
    pub async fn connect_with(config: PostgresConfig) -> Result<Self> {
        let driver = PostgresDriver::new(config.compile_options());
        let schema = config.schema.clone();
        let pool = PgPool::establish(config).await?;
        Ok(Self {
            driver,
            pool,
            schema,
        })
    }

    /// Compiles and runs a read query, returning typed rows, the row count
    /// and the output fields.
    pub async fn query(&mut self, query: &QueryDescriptor) -> Result<QueryOutput> {
        fetch_output(self, query).await
    }

    /// Array-mode variant of [`query`](Self::query): positional tuples.
    pub async fn arrays(&mut self, query: &QueryDescriptor) -> Result<Vec<Row>> {
        fetch_arrays(self, query).await
    }

    /// Compiles a read query without executing it.
    pub fn compile(&self, query: &QueryDescriptor) -> Result<CompiledSql> {
        compile_select(
            self.driver.sql_writer().as_dyn(),
            query,
            self.driver.compile_options(),
        )
    }

    /// Compiles and runs an insert, executing batch entries in order when
    /// the statement had to be split.
    pub async fn insert(&mut self, insert: &InsertDescriptor) -> Result<RowsAffected> {
        let compiled = compile_insert(
            self.driver.sql_writer().as_dyn(),
            insert,
            self.driver.compile_options(),
        )?;
        self.execute_all(compiled).await
    }

    pub async fn update(&mut self, update: &UpdateDescriptor) -> Result<RowsAffected> {
        let compiled = compile_update(
            self.driver.sql_writer().as_dyn(),
            update,
            self.driver.compile_options(),
        )?;
        self.execute_all(Compiled::Single(compiled)).await
    }

    pub async fn delete(&mut self, delete: &DeleteDescriptor) -> Result<RowsAffected> {
        let compiled = compile_delete(
            self.driver.sql_writer().as_dyn(),
            delete,
            self.driver.compile_options(),
        )?;
        self.execute_all(Compiled::Single(compiled)).await
    }

    /// Race-safe create-if-absent: one round trip when the row exists, two
    /// when the guarded CTE create has to run.
    pub async fn or_create(
        &mut self,
        find: &QueryDescriptor,
        create: &InsertDescriptor,
    ) -> Result<RowLabeled> {
        let plan = compile_or_create(
            self.driver.sql_writer().as_dyn(),
            find,
            create,
            self.driver.compile_options(),
        )?;
        run_or_create(self, &plan).await
    }

    /// Update-or-create: the UPDATE probe first, then the create-if-absent
    /// pair fed with the update's values.
    pub async fn upsert(
        &mut self,
        update: &UpdateDescriptor,
        create: &InsertDescriptor,
    ) -> Result<RowLabeled> {
        let plan = compile_upsert(
            self.driver.sql_writer().as_dyn(),
            update,
            create,
            self.driver.compile_options(),
        )?;
        run_upsert(self, &plan).await
    }

    pub async fn begin_with(&mut self, mode: TransactionMode) -> Result<PostgresTransaction> {
        PostgresTransaction::begin(self, mode).await
    }
}

impl Executor for PostgresConnection {
    type Driver = PostgresDriver;

    fn driver(&self) -> &Self::Driver {
        &self.driver
    }

    fn run(&mut self, sql: CompiledSql) -> impl Stream<Item = Result<QueryResult>> + Send {
        let pool = self.pool.clone();
        let schema = self.schema.clone();
        try_stream! {
            let mut handle = pool.acquire().await?;
            apply_search_path(&mut handle, schema.as_deref()).await?;
            log::debug!("running: {}", sql);
            let holders: Vec<ValueHolder> = sql.values.iter().cloned().map(ValueHolder).collect();
            let rows = handle
                .client()
                .query_raw(sql.text.as_str(), holders.iter().map(|v| v as &dyn ToSql))
                .await
                .map_err(statement_error)?;
            let mut rows = pin!(rows);
            let mut labels: Option<RowNames> = None;
            while let Some(row) = rows.try_next().await.map_err(statement_error)? {
                let labels = labels.get_or_insert_with(|| row_labels(&row));
                yield QueryResult::Row(labeled(labels, row)?);
            }
            let affected = rows.rows_affected().unwrap_or(0);
            yield QueryResult::Affected(RowsAffected {
                rows_affected: affected,
            });
            // `handle` drops here and rejoins the pool; an error path drops
            // it the same way when the stream unwinds.
        }
    }
}

impl Connection for PostgresConnection {
    type Transaction<'c>
        = PostgresTransaction
    where
        Self: 'c;

    async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(PostgresConfig::from_url(url)?).await
    }

    async fn begin(&mut self) -> Result<PostgresTransaction> {
        self.begin_with(TransactionMode::default()).await
    }
}

/// Sets the session default schema, but only when it differs from what the
/// handle's session already uses.
pub(crate) async fn apply_search_path(
    handle: &mut PooledConnection,
    schema: Option<&str>,
) -> Result<()> {
    let Some(schema) = schema else {
        return Ok(());
    };
    if handle.search_path() == Some(schema) {
        return Ok(());
    }
    let mut sql = String::from("SET search_path TO ");
    crate::PostgresSqlWriter::new().write_identifier_quoted(&mut sql, schema);
    handle
        .client()
        .batch_execute(&sql)
        .await
        .map_err(statement_error)?;
    handle.set_search_path(schema.to_string());
    Ok(())
}
