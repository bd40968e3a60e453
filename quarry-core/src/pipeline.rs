use crate::{
    Driver, Executor, QueryDescriptor, Result, Row, RowLabeled, RowNames, ShapeEntry, SqlWriter,
    compile_select,
    stream::TryStreamExt,
};

/// Result of a row-mode query: typed rows, the row count, and the output
/// field names after logical-key renaming.
#[derive(Debug, Default)]
pub struct QueryOutput {
    pub rows: Vec<RowLabeled>,
    pub row_count: u64,
    pub fields: RowNames,
}

/// Every shape entry a query's output columns may come from: the target
/// relation, its CTEs and every joined source.
pub fn response_entries(query: &QueryDescriptor) -> Vec<ShapeEntry> {
    let mut entries: Vec<ShapeEntry> = query.shape.entries().to_vec();
    for cte in &query.ctes {
        entries.extend(cte.shape.entries().iter().cloned());
    }
    for join in &query.joins {
        entries.extend(join.shape.entries().iter().cloned());
    }
    entries
}

/// Maps one raw row through the resolved per-column parsers: the parse
/// codec runs on the value and the wire label is replaced by the logical
/// key. Columns no entry claims pass through untouched.
pub fn parse_row(entries: &[ShapeEntry], row: RowLabeled) -> Result<RowLabeled> {
    let mut labels = Vec::with_capacity(row.labels.len());
    let mut values = Vec::with_capacity(row.values.len());
    for (label, value) in row.labels.iter().zip(row.values.into_iter()) {
        match entries.iter().find(|entry| entry.column == *label) {
            Some(entry) => {
                labels.push(entry.key.to_string());
                values.push(match entry.parse {
                    Some(parse) => parse(value)?,
                    None => value,
                });
            }
            None => {
                labels.push(label.clone());
                values.push(value);
            }
        }
    }
    Ok(RowLabeled::new(labels.into(), values.into()))
}

/// Compiles and runs a read query, collecting typed rows.
pub async fn fetch_output<E: Executor>(
    executor: &mut E,
    query: &QueryDescriptor,
) -> Result<QueryOutput> {
    let writer = executor.driver().sql_writer();
    let options = executor.driver().compile_options();
    let compiled = compile_select(writer.as_dyn(), query, options)?;
    let entries = response_entries(query);
    let raw: Vec<RowLabeled> = executor.fetch(compiled).try_collect().await?;
    let rows = raw
        .into_iter()
        .map(|row| parse_row(&entries, row))
        .collect::<Result<Vec<_>>>()?;
    let fields = rows
        .first()
        .map(|row| row.labels.clone())
        .unwrap_or_default();
    Ok(QueryOutput {
        row_count: rows.len() as u64,
        fields,
        rows,
    })
}

/// Compiles and runs a read query in array mode: positional tuples, parsed
/// through the same per-column codecs but without labels.
pub async fn fetch_arrays<E: Executor>(
    executor: &mut E,
    query: &QueryDescriptor,
) -> Result<Vec<Row>> {
    let output = fetch_output(executor, query).await?;
    Ok(output.rows.into_iter().map(Row::from).collect())
}
