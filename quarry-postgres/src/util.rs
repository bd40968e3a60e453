use crate::ValueHolder;
use quarry_core::{Error, QuarryError, Result, Row, RowLabeled, RowNames, StatementError};

/// Wraps a backend failure observed while connecting.
pub(crate) fn connection_error(e: tokio_postgres::Error) -> Error {
    QuarryError::Connection(e.to_string()).into()
}

/// Surfaces a database-reported failure with its structured fields; other
/// protocol failures pass through as-is.
pub(crate) fn statement_error(e: tokio_postgres::Error) -> Error {
    match e.as_db_error() {
        Some(db) => QuarryError::Statement(StatementError {
            message: db.message().to_string(),
            code: db.code().code().to_string(),
            detail: db.detail().map(str::to_string),
            schema: db.schema().map(str::to_string),
            table: db.table().map(str::to_string),
            column: db.column().map(str::to_string),
            constraint: db.constraint().map(str::to_string),
        })
        .into(),
        None => Error::new(e),
    }
}

pub(crate) fn row_to_quarry_row(row: tokio_postgres::Row) -> Result<Row> {
    (0..row.len())
        .map(|i| match row.try_get::<_, ValueHolder>(i) {
            Ok(v) => Ok(v.0),
            Err(..) => {
                let col = &row.columns()[i];
                Err(Error::msg(format!(
                    "could not deserialize column {} `{}`: {}",
                    i,
                    col.name(),
                    col.type_()
                )))
            }
        })
        .collect::<Result<Row>>()
}

pub(crate) fn row_labels(row: &tokio_postgres::Row) -> RowNames {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

pub(crate) fn labeled(labels: &RowNames, row: tokio_postgres::Row) -> Result<RowLabeled> {
    Ok(RowLabeled::new(labels.clone(), row_to_quarry_row(row)?))
}
