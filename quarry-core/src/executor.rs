use crate::{
    CompileOptions, Compiled, CompiledSql, OrCreatePlan, QueryResult, Result, RowLabeled,
    RowsAffected, SqlWriter, UpsertPlan,
    stream::{Stream, StreamExt, TryStreamExt},
};
use anyhow::Error;
use std::{future::Future, pin::pin};

/// Ties an executor to its dialect writer and compile knobs.
pub trait Driver {
    type SqlWriter: SqlWriter;

    const NAME: &'static str;

    fn sql_writer(&self) -> Self::SqlWriter;

    fn compile_options(&self) -> CompileOptions {
        CompileOptions::default()
    }
}

/// Anything that can put a compiled statement on the wire: a pooled
/// connection or an open transaction.
pub trait Executor: Send {
    type Driver: Driver;

    fn driver(&self) -> &Self::Driver;

    /// General method to send any statement and stream back every result
    /// item (rows followed by the affected-count summary).
    fn run(&mut self, sql: CompiledSql) -> impl Stream<Item = Result<QueryResult>> + Send;

    /// Execute the statement and stream the rows.
    fn fetch(&mut self, sql: CompiledSql) -> impl Stream<Item = Result<RowLabeled>> + Send {
        self.run(sql).filter_map(|item| async move {
            match item {
                Ok(QueryResult::Row(row)) => Some(Ok(row)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute the statement and return the total number of rows affected.
    fn execute(
        &mut self,
        sql: CompiledSql,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.run(sql)
            .filter_map(|item| async move {
                match item {
                    Ok(QueryResult::Affected(affected)) => Some(Ok(affected)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }

    /// Execute every statement of a compiled mutation in order, accumulating
    /// the affected-row counts. This is the caller contract for batches a
    /// split insert produced.
    fn execute_all(
        &mut self,
        compiled: Compiled,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        async move {
            let mut total = RowsAffected::default();
            for sql in compiled.into_statements() {
                total.extend([self.execute(sql).await?]);
            }
            Ok(total)
        }
    }
}

/// A pool-backed entry point able to hand out transactions.
pub trait Connection: Executor {
    type Transaction<'c>: Transaction
    where
        Self: 'c;

    /// Establish the connection pool for the given URL.
    fn connect(url: &str) -> impl Future<Output = Result<Self>> + Send
    where
        Self: Sized;

    /// Open a transaction spanning one physical connection.
    fn begin(&mut self) -> impl Future<Output = Result<Self::Transaction<'_>>> + Send;
}

/// An open transaction; consuming it settles the outcome.
pub trait Transaction: Executor {
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

/// Runs a compiled create-if-absent plan: one round trip when the row
/// exists, two when the race-safe CTE create has to run.
pub async fn run_or_create<E: Executor>(
    executor: &mut E,
    plan: &OrCreatePlan,
) -> Result<RowLabeled> {
    {
        let mut found = pin!(executor.fetch(plan.find.clone()));
        if let Some(row) = found.try_next().await? {
            return Ok(row);
        }
    }
    let mut created = pin!(executor.fetch(plan.create.clone()));
    created
        .try_next()
        .await?
        .ok_or_else(|| Error::msg("create-if-absent returned no row"))
}

/// Runs a compiled upsert plan: the UPDATE probe first, falling back to the
/// create-if-absent pair only when it affected no row.
pub async fn run_upsert<E: Executor>(executor: &mut E, plan: &UpsertPlan) -> Result<RowLabeled> {
    {
        let mut updated = pin!(executor.fetch(plan.update.clone()));
        if let Some(row) = updated.try_next().await? {
            return Ok(row);
        }
    }
    let fallback = OrCreatePlan {
        find: plan.find.clone(),
        create: plan.create.clone(),
    };
    run_or_create(executor, &fallback).await
}
