use crate::{
    CompileOptions, Compiled, CompiledSql, Context, Predicate, QueryDescriptor, RawFragment,
    Result, Shape, SqlWriter, TableRef, Value, compile_error, compile_select,
    protocol_limit_error,
};
use std::borrow::Cow;

/// One cell of an insert row.
#[derive(Debug, Clone)]
pub enum InsertValue {
    Value(Value),
    /// Renders the SQL keyword `DEFAULT`.
    Default,
    Raw(RawFragment),
    /// A nested create: hoisted into a WITH clause, the cell becomes a
    /// scalar select of `select` from the hoisted CTE.
    Nested {
        insert: Box<InsertDescriptor>,
        select: Cow<'static, str>,
    },
}

#[derive(Debug, Clone, Default)]
pub enum Returning {
    #[default]
    None,
    All,
    Columns(Vec<Cow<'static, str>>),
}

/// Value assigned by UPDATE or by a conflict clause.
#[derive(Debug, Clone)]
pub enum SetValue {
    Value(Value),
    Raw(RawFragment),
    /// `jsonb_set(col, path, value)`
    JsonSet { path: Vec<String>, value: Value },
    /// `jsonb_insert(col, path, value)`
    JsonInsert { path: Vec<String>, value: Value },
    /// `col #- path`
    JsonRemove { path: Vec<String> },
}

#[derive(Debug, Clone)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<(Cow<'static, str>, SetValue)>),
    /// Sets every non-target insert column to its EXCLUDED value; degrades
    /// to a self-referential no-op assignment when no column remains.
    Merge,
}

#[derive(Debug, Clone)]
pub struct OnConflict {
    pub target: Vec<Cow<'static, str>>,
    pub action: ConflictAction,
}

/// Describes one logical INSERT; `columns` are logical keys resolved through
/// `shape`, and every row must carry exactly one cell per column.
#[derive(Debug, Clone)]
pub struct InsertDescriptor {
    pub table: TableRef,
    pub shape: Shape,
    pub columns: Vec<Cow<'static, str>>,
    pub rows: Vec<Vec<InsertValue>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Returning,
}

impl InsertDescriptor {
    pub fn new(
        table: TableRef,
        shape: Shape,
        columns: impl IntoIterator<Item = impl Into<Cow<'static, str>>>,
    ) -> Self {
        Self {
            table,
            shape,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            on_conflict: None,
            returning: Returning::None,
        }
    }

    pub fn row(mut self, row: impl IntoIterator<Item = InsertValue>) -> Self {
        self.rows.push(row.into_iter().collect());
        self
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }

    fn has_nested(&self) -> bool {
        self.rows
            .iter()
            .flatten()
            .any(|cell| matches!(cell, InsertValue::Nested { .. }))
    }

    fn conflict_params(&self) -> usize {
        match &self.on_conflict {
            Some(OnConflict {
                action: ConflictAction::DoUpdate(assignments),
                ..
            }) => assignments.iter().map(|(_, v)| set_value_params(v)).sum(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateDescriptor {
    pub table: TableRef,
    pub shape: Shape,
    pub set: Vec<(Cow<'static, str>, SetValue)>,
    pub filter: Option<Predicate>,
    pub returning: Returning,
}

impl UpdateDescriptor {
    pub fn new(table: TableRef, shape: Shape) -> Self {
        Self {
            table,
            shape,
            set: Vec::new(),
            filter: None,
            returning: Returning::None,
        }
    }

    pub fn set(mut self, column: impl Into<Cow<'static, str>>, value: SetValue) -> Self {
        self.set.push((column.into(), value));
        self
    }

    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn returning(mut self, returning: Returning) -> Self {
        self.returning = returning;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DeleteDescriptor {
    pub table: TableRef,
    pub shape: Shape,
    pub filter: Option<Predicate>,
    pub returning: Returning,
}

impl DeleteDescriptor {
    pub fn new(table: TableRef, shape: Shape) -> Self {
        Self {
            table,
            shape,
            filter: None,
            returning: Returning::None,
        }
    }

    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Compiled create-if-absent: run `find`; only when it returns nothing, run
/// `create`, whose CTE form re-checks existence on the server so the two
/// round trips stay race-safe without a client transaction.
#[derive(Debug, Clone)]
pub struct OrCreatePlan {
    pub find: CompiledSql,
    pub create: CompiledSql,
}

/// Compiled upsert: run `update`; zero affected rows falls back to the
/// create-if-absent pair.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub update: CompiledSql,
    pub find: CompiledSql,
    pub create: CompiledSql,
}

fn set_value_params(value: &SetValue) -> usize {
    match value {
        SetValue::Value(..) => 1,
        SetValue::Raw(fragment) => fragment.params.len(),
        SetValue::JsonSet { .. } | SetValue::JsonInsert { .. } => 2,
        SetValue::JsonRemove { .. } => 1,
    }
}

fn cell_params(cell: &InsertValue) -> usize {
    match cell {
        InsertValue::Value(..) => 1,
        InsertValue::Default => 0,
        InsertValue::Raw(fragment) => fragment.params.len(),
        InsertValue::Nested { insert, .. } => statement_params(insert),
    }
}

fn row_params(row: &[InsertValue]) -> usize {
    row.iter().map(cell_params).sum()
}

fn statement_params(insert: &InsertDescriptor) -> usize {
    insert.rows.iter().map(|row| row_params(row)).sum::<usize>() + insert.conflict_params()
}

/// Compiles an INSERT, splitting a multi-row statement into an ordered batch
/// when its parameters would exceed the protocol ceiling. Statements that
/// hoist nested creates into cross-referenced CTEs cannot be split and fail
/// fast instead.
pub fn compile_insert(
    writer: &dyn SqlWriter,
    insert: &InsertDescriptor,
    options: CompileOptions,
) -> Result<Compiled> {
    if insert.rows.is_empty() {
        return Err(compile_error("insert has no rows"));
    }
    if insert.has_nested() {
        let total = statement_params(insert);
        if total > options.max_params {
            return Err(protocol_limit_error(format!(
                "insert with nested creates binds {} parameters, exceeding the ceiling of {}, \
                 and cross-referenced CTEs cannot be split",
                total, options.max_params
            )));
        }
        return Ok(Compiled::Single(compile_insert_chunk(
            writer,
            insert,
            &insert.rows,
            options,
        )?));
    }
    let ceiling = options.max_params.saturating_sub(insert.conflict_params());
    let mut chunks: Vec<&[Vec<InsertValue>]> = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, row) in insert.rows.iter().enumerate() {
        let params = row_params(row);
        if params > ceiling {
            return Err(protocol_limit_error(format!(
                "a single row binds {} parameters, exceeding the ceiling of {}",
                params, ceiling
            )));
        }
        if count + params > ceiling {
            chunks.push(&insert.rows[start..i]);
            start = i;
            count = 0;
        }
        count += params;
    }
    chunks.push(&insert.rows[start..]);
    if chunks.len() > 1 {
        log::debug!(
            "splitting insert of {} rows into {} statements to respect the {}-parameter ceiling",
            insert.rows.len(),
            chunks.len(),
            options.max_params
        );
    }
    if chunks.len() == 1 {
        return Ok(Compiled::Single(compile_insert_chunk(
            writer,
            insert,
            chunks[0],
            options,
        )?));
    }
    let batch = chunks
        .into_iter()
        .map(|rows| compile_insert_chunk(writer, insert, rows, options))
        .collect::<Result<Vec<_>>>()?;
    Ok(Compiled::Batch(batch))
}

fn compile_insert_chunk(
    writer: &dyn SqlWriter,
    insert: &InsertDescriptor,
    rows: &[Vec<InsertValue>],
    options: CompileOptions,
) -> Result<CompiledSql> {
    let mut ctx = Context::new(options);
    let mut text = String::with_capacity(256);
    writer.write_insert_statement(&mut ctx, &mut text, insert, rows)?;
    Ok(CompiledSql::new(text, ctx.params))
}

/// Compiles an UPDATE. A single statement binding more parameters than the
/// ceiling cannot be split and fails fast.
pub fn compile_update(
    writer: &dyn SqlWriter,
    update: &UpdateDescriptor,
    options: CompileOptions,
) -> Result<CompiledSql> {
    if update.set.is_empty() {
        return Err(compile_error("update has no assignments"));
    }
    let mut ctx = Context::new(options);
    let mut text = String::with_capacity(256);
    writer.write_update(&mut ctx, &mut text, update)?;
    if ctx.params.len() > options.max_params {
        return Err(protocol_limit_error(format!(
            "update binds {} parameters, exceeding the ceiling of {}",
            ctx.params.len(),
            options.max_params
        )));
    }
    Ok(CompiledSql::new(text, ctx.params))
}

pub fn compile_delete(
    writer: &dyn SqlWriter,
    delete: &DeleteDescriptor,
    options: CompileOptions,
) -> Result<CompiledSql> {
    let mut ctx = Context::new(options);
    let mut text = String::with_capacity(128);
    writer.write_delete(&mut ctx, &mut text, delete)?;
    Ok(CompiledSql::new(text, ctx.params))
}

/// Compiles the race-safe create-if-absent pair: a cheap existence query and
/// the `WITH found AS (...), inserted AS (INSERT ... WHERE NOT EXISTS ...)`
/// statement run only when the first finds nothing.
pub fn compile_or_create(
    writer: &dyn SqlWriter,
    find: &QueryDescriptor,
    create: &InsertDescriptor,
    options: CompileOptions,
) -> Result<OrCreatePlan> {
    if create.rows.len() != 1 {
        return Err(compile_error(
            "create-if-absent expects exactly one row to create",
        ));
    }
    if create.has_nested() {
        return Err(compile_error(
            "create-if-absent cannot hoist nested creates",
        ));
    }
    let row = &create.rows[0];
    if row_params(row) > options.max_params {
        return Err(protocol_limit_error(format!(
            "a single row binds {} parameters, exceeding the ceiling of {}",
            row_params(row),
            options.max_params
        )));
    }
    let find_sql = compile_select(writer, find, options)?;
    let mut ctx = Context::new(options);
    let mut text = String::with_capacity(512);
    text.push_str("WITH found AS (");
    writer.write_select(&mut ctx, &mut text, find)?;
    text.push_str("), inserted AS (INSERT INTO ");
    writer.write_table_ref(&mut text, &create.table, false);
    text.push_str(" (");
    crate::try_separated_by(
        &mut text,
        &create.columns,
        |out, key| {
            let entry = create.shape.by_key(key).ok_or_else(|| {
                compile_error(format!(
                    "insert column `{}` does not exist in the shape of `{}`",
                    key, create.table.name
                ))
            })?;
            writer.write_identifier_quoted(out, &entry.column);
            Ok(())
        },
        ", ",
    )?;
    text.push_str(") SELECT ");
    crate::try_separated_by(
        &mut text,
        row.iter().enumerate(),
        |out, (i, cell)| match cell {
            InsertValue::Value(value) => {
                let entry = create.shape.by_key(&create.columns[i]).ok_or_else(|| {
                    compile_error(format!(
                        "insert column `{}` does not exist in the shape of `{}`",
                        create.columns[i], create.table.name
                    ))
                })?;
                let value = match entry.encode {
                    Some(encode) => encode(value.clone())?,
                    None => value.clone(),
                };
                ctx.encode(out, value)
            }
            InsertValue::Raw(fragment) => ctx.splice_raw(out, fragment),
            InsertValue::Default | InsertValue::Nested { .. } => Err(compile_error(
                "create-if-absent rows support only plain values and raw fragments",
            )),
        },
        ", ",
    )?;
    text.push_str(
        " WHERE NOT EXISTS (SELECT 1 FROM found) RETURNING *)\n\
         SELECT * FROM found UNION ALL SELECT * FROM inserted",
    );
    Ok(OrCreatePlan {
        find: find_sql,
        create: CompiledSql::new(text, ctx.params),
    })
}

/// Compiles an upsert: an `UPDATE ... RETURNING *` probe plus the
/// create-if-absent pair fed with the update's supplied values.
pub fn compile_upsert(
    writer: &dyn SqlWriter,
    update: &UpdateDescriptor,
    create: &InsertDescriptor,
    options: CompileOptions,
) -> Result<UpsertPlan> {
    let filter = update
        .filter
        .clone()
        .ok_or_else(|| compile_error("upsert requires an update filter"))?;
    let mut probe = update.clone();
    probe.returning = Returning::All;
    let update_sql = compile_update(writer, &probe, options)?;
    let create = merge_update_into_create(update, create)?;
    let find = QueryDescriptor::new(update.table.clone(), update.shape.clone())
        .filter(filter)
        .limit(1);
    let or_create = compile_or_create(writer, &find, &create, options)?;
    Ok(UpsertPlan {
        update: update_sql,
        find: or_create.find,
        create: or_create.create,
    })
}

/// Feeds plain update assignments into the create payload: a column already
/// proposed is overwritten, a new one is appended. Computed assignments
/// (raw fragments, JSON mutations) only make sense against an existing row
/// and are left out of the created one.
fn merge_update_into_create(
    update: &UpdateDescriptor,
    create: &InsertDescriptor,
) -> Result<InsertDescriptor> {
    let mut merged = create.clone();
    let row = merged
        .rows
        .first_mut()
        .ok_or_else(|| compile_error("create-if-absent expects exactly one row to create"))?;
    for (key, value) in &update.set {
        let SetValue::Value(value) = value else {
            continue;
        };
        match merged.columns.iter().position(|column| column == key) {
            Some(i) => row[i] = InsertValue::Value(value.clone()),
            None => {
                merged.columns.push(key.clone());
                row.push(InsertValue::Value(value.clone()));
            }
        }
    }
    Ok(merged)
}
