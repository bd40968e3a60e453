use crate::{
    ColumnRef, CompileOptions, CompiledSql, Comparison, ConflictAction, Context,
    DeleteDescriptor, Direction, InsertDescriptor, InsertValue, JoinClass, JoinTarget, Operand,
    OrderBy, Predicate, QueryDescriptor, ResolvedJoin, Result, Returning, SelectItem, SetValue,
    Shape, TableRef, UpdateDescriptor, Value, compile_error, join::resolve_joins,
    try_separated_by,
};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// Dialect printer turning descriptor trees into concrete SQL text while the
/// [`Context`] collects bound parameters. Placeholders are rendered strictly
/// left to right, which is what keeps text order and parameter order equal.
pub trait SqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter;

    /// Escape occurrences of `search` with `replace` while copying into the
    /// buffer.
    fn write_escaped(&self, out: &mut String, value: &str, search: char, replace: &str) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + 1;
            }
        }
        out.push_str(&value[position..]);
    }

    /// Quote an identifier, doubling inner quotes.
    fn write_identifier_quoted(&self, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(out, value, '"', r#""""#);
        out.push('"');
    }

    /// Render a relation reference; a declaration also prints the alias.
    fn write_table_ref(&self, out: &mut String, value: &TableRef, is_declaration: bool) {
        if !is_declaration && !value.alias.is_empty() {
            out.push_str(&value.alias);
        } else {
            if !value.schema.is_empty() {
                self.write_identifier_quoted(out, &value.schema);
                out.push('.');
            }
            self.write_identifier_quoted(out, &value.name);
        }
        if is_declaration && !value.alias.is_empty() {
            out.push(' ');
            out.push_str(&value.alias);
        }
    }

    /// Resolve a column against the scope and render it, qualifying with the
    /// source alias when the query joins several sources, the reference was
    /// explicit, or resolution landed in an enclosing query.
    fn write_column<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        column: &ColumnRef,
    ) -> Result<()> {
        let resolved = ctx.resolve(column)?;
        if ctx.qualify_columns || !column.table.is_empty() || resolved.outer {
            out.push_str(resolved.qualifier);
            out.push('.');
        }
        self.write_identifier_quoted(out, &resolved.entry.column);
        Ok(())
    }

    fn write_select_item<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        item: &'a SelectItem,
    ) -> Result<()> {
        match item {
            SelectItem::All => out.push('*'),
            SelectItem::AllFrom(alias) => {
                let rendered = ctx.rendered_alias(alias).ok_or_else(|| {
                    compile_error(format!("`{}.*` does not name a visible source", alias))
                })?;
                out.push_str(rendered);
                out.push_str(".*");
            }
            SelectItem::Column(column) => self.write_column(ctx, out, column)?,
            SelectItem::Raw { fragment, alias } => {
                ctx.splice_raw(out, fragment)?;
                out.push_str(" AS ");
                self.write_identifier_quoted(out, alias);
            }
        }
        Ok(())
    }

    /// Render one read query into `out`. CTEs come first so their
    /// parameters take the lowest placeholder numbers, then joins are
    /// resolved (classification, deduplication, shape propagation) before
    /// any select item renders, and finally every clause is emitted in text
    /// order.
    fn write_select<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        query: &'a QueryDescriptor,
    ) -> Result<()> {
        ctx.descend()?;
        if !query.ctes.is_empty() {
            out.push_str("WITH ");
            try_separated_by(
                out,
                &query.ctes,
                |out, cte| {
                    self.write_identifier_quoted(out, &cte.name);
                    out.push_str(" AS (");
                    self.as_dyn().write_select(ctx, out, &cte.query)?;
                    out.push(')');
                    ctx.register_cte(&cte.name, &cte.shape);
                    Ok(())
                },
                ", ",
            )?;
            out.push('\n');
        }
        ctx.push_frame();
        let target_name = query.table.reference_name();
        let target_shape = if query.table.schema.is_empty() {
            ctx.cte_shape(&query.table.name).unwrap_or(&query.shape)
        } else {
            &query.shape
        };
        ctx.add_source(target_name, target_name, target_shape);
        let prev_qualify = ctx.qualify_columns;
        ctx.qualify_columns = !query.joins.is_empty();
        let joins = resolve_joins(self.as_dyn(), ctx, &query.joins)?;
        out.push_str("SELECT ");
        if query.distinct {
            out.push_str("DISTINCT ");
        }
        try_separated_by(
            out,
            &query.columns,
            |out, item| self.write_select_item(ctx, out, item),
            ", ",
        )?;
        out.push_str("\nFROM ");
        self.write_table_ref(out, &query.table, true);
        for join in &joins {
            self.write_join(ctx, out, join)?;
        }
        if let Some(filter) = &query.filter {
            out.push_str("\nWHERE ");
            self.write_predicate(ctx, out, filter)?;
        }
        if !query.group_by.is_empty() {
            out.push_str("\nGROUP BY ");
            try_separated_by(
                out,
                &query.group_by,
                |out, column| self.write_column(ctx, out, column),
                ", ",
            )?;
        }
        if !query.order_by.is_empty() {
            out.push_str("\nORDER BY ");
            try_separated_by(
                out,
                &query.order_by,
                |out, order| self.write_order_by(ctx, out, order),
                ", ",
            )?;
        }
        if let Some(limit) = query.limit {
            out.push_str("\nLIMIT ");
            write_integer!(out, limit);
        }
        if let Some(offset) = query.offset {
            out.push_str("\nOFFSET ");
            write_integer!(out, offset);
        }
        ctx.qualify_columns = prev_qualify;
        ctx.pop_frame();
        ctx.ascend();
        Ok(())
    }

    fn write_order_by<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        order: &OrderBy,
    ) -> Result<()> {
        self.write_column(ctx, out, &order.column)?;
        if order.direction == Direction::Descending {
            out.push_str(" DESC");
        }
        Ok(())
    }

    fn write_join<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        join: &ResolvedJoin<'a>,
    ) -> Result<()> {
        if !join.emit {
            return Ok(());
        }
        out.push('\n');
        out.push_str(join.spec.kind.sql());
        out.push(' ');
        match &join.spec.target {
            JoinTarget::Table(table) => {
                if !table.schema.is_empty() {
                    self.write_identifier_quoted(out, &table.schema);
                    out.push('.');
                }
                self.write_identifier_quoted(out, &table.name);
                if join.rendered_alias != table.name {
                    out.push(' ');
                    out.push_str(join.rendered_alias);
                }
            }
            JoinTarget::Cte(name) => {
                self.write_identifier_quoted(out, name);
                if join.rendered_alias != *name {
                    out.push(' ');
                    out.push_str(join.rendered_alias);
                }
            }
            JoinTarget::Subquery(sub) => {
                if join.class == JoinClass::Lateral {
                    out.push_str("LATERAL ");
                }
                out.push('(');
                self.as_dyn().write_select(ctx, out, sub)?;
                out.push_str(") ");
                out.push_str(join.rendered_alias);
            }
        }
        if join.class == JoinClass::Lateral {
            out.push_str(" ON true");
        } else if let Some(on) = &join.spec.on {
            out.push_str(" ON ");
            self.write_predicate(ctx, out, on)?;
        } else {
            out.push_str(" ON true");
        }
        Ok(())
    }

    /// Boolean-tree walker: AND chains flatten, every OR branch is
    /// parenthesized, NOT parenthesizes its operand.
    fn write_predicate<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        predicate: &'a Predicate,
    ) -> Result<()> {
        match predicate {
            Predicate::And(branches) if branches.is_empty() => out.push_str("true"),
            Predicate::And(branches) => {
                try_separated_by(
                    out,
                    branches,
                    |out, branch| {
                        let parens = matches!(branch, Predicate::Or(inner) if !inner.is_empty());
                        if parens {
                            out.push('(');
                        }
                        self.as_dyn().write_predicate(ctx, out, branch)?;
                        if parens {
                            out.push(')');
                        }
                        Ok(())
                    },
                    " AND ",
                )?;
            }
            Predicate::Or(branches) if branches.is_empty() => out.push_str("false"),
            Predicate::Or(branches) => {
                try_separated_by(
                    out,
                    branches,
                    |out, branch| {
                        out.push('(');
                        self.as_dyn().write_predicate(ctx, out, branch)?;
                        out.push(')');
                        Ok(())
                    },
                    " OR ",
                )?;
            }
            Predicate::Not(inner) => {
                out.push_str("NOT (");
                self.as_dyn().write_predicate(ctx, out, inner)?;
                out.push(')');
            }
            Predicate::Compare { target, op } => self.write_comparison(ctx, out, target, op)?,
            Predicate::Raw(fragment) => ctx.splice_raw(out, fragment)?,
        }
        Ok(())
    }

    fn write_comparison<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        target: &ColumnRef,
        op: &'a Comparison,
    ) -> Result<()> {
        let mut lhs = String::new();
        self.write_column(ctx, &mut lhs, target)?;
        match op {
            // A null operand compares through IS [NOT] NULL; `= NULL` is
            // never emitted.
            Comparison::Equal(Operand::Value(v)) if v.is_null() => {
                out.push_str(&lhs);
                out.push_str(" IS NULL");
            }
            Comparison::NotEqual(Operand::Value(v)) if v.is_null() => {
                out.push_str(&lhs);
                out.push_str(" IS NOT NULL");
            }
            Comparison::Equal(operand) => self.write_infix(ctx, out, &lhs, " = ", operand)?,
            Comparison::NotEqual(operand) => self.write_infix(ctx, out, &lhs, " <> ", operand)?,
            Comparison::Less(operand) => self.write_infix(ctx, out, &lhs, " < ", operand)?,
            Comparison::LessEqual(operand) => self.write_infix(ctx, out, &lhs, " <= ", operand)?,
            Comparison::Greater(operand) => self.write_infix(ctx, out, &lhs, " > ", operand)?,
            Comparison::GreaterEqual(operand) => {
                self.write_infix(ctx, out, &lhs, " >= ", operand)?
            }
            Comparison::Between(low, high) => {
                out.push_str(&lhs);
                out.push_str(" BETWEEN ");
                self.write_operand(ctx, out, low)?;
                out.push_str(" AND ");
                self.write_operand(ctx, out, high)?;
            }
            Comparison::In(Operand::Subquery(sub)) => {
                out.push_str(&lhs);
                out.push_str(" IN (");
                self.as_dyn().write_select(ctx, out, sub)?;
                out.push(')');
            }
            Comparison::NotIn(Operand::Subquery(sub)) => {
                out.push_str(&lhs);
                out.push_str(" NOT IN (");
                self.as_dyn().write_select(ctx, out, sub)?;
                out.push(')');
            }
            Comparison::In(operand) => {
                out.push_str(&lhs);
                out.push_str(" = ANY(");
                self.write_operand(ctx, out, operand)?;
                out.push(')');
            }
            Comparison::NotIn(operand) => {
                out.push_str(&lhs);
                out.push_str(" <> ALL(");
                self.write_operand(ctx, out, operand)?;
                out.push(')');
            }
            Comparison::Like(operand) => self.write_infix(ctx, out, &lhs, " LIKE ", operand)?,
            Comparison::NotLike(operand) => {
                self.write_infix(ctx, out, &lhs, " NOT LIKE ", operand)?
            }
            Comparison::ILike(operand) => self.write_infix(ctx, out, &lhs, " ILIKE ", operand)?,
            Comparison::NotILike(operand) => {
                self.write_infix(ctx, out, &lhs, " NOT ILIKE ", operand)?
            }
            Comparison::ArrayContains(operand) => {
                self.write_infix(ctx, out, &lhs, " @> ", operand)?
            }
            Comparison::ArrayContainedBy(operand) => {
                self.write_infix(ctx, out, &lhs, " <@ ", operand)?
            }
            Comparison::ArrayOverlaps(operand) => {
                self.write_infix(ctx, out, &lhs, " && ", operand)?
            }
            // Coalesce so an empty or absent array compares as length 0
            // instead of NULL.
            Comparison::ArrayLength(cmp, operand) => {
                out.push_str("COALESCE(array_length(");
                out.push_str(&lhs);
                out.push_str(", 1), 0) ");
                out.push_str(cmp.sql());
                out.push(' ');
                self.write_operand(ctx, out, operand)?;
            }
            Comparison::JsonContains(operand) => {
                self.write_infix(ctx, out, &lhs, " @> ", operand)?
            }
            Comparison::JsonPathEquals(path, operand) => {
                out.push_str(&lhs);
                out.push_str(" #>> ");
                ctx.encode(out, text_array(path))?;
                out.push_str(" = ");
                self.write_operand(ctx, out, operand)?;
            }
        }
        Ok(())
    }

    fn write_infix<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        lhs: &str,
        infix: &str,
        operand: &'a Operand,
    ) -> Result<()> {
        out.push_str(lhs);
        out.push_str(infix);
        self.write_operand(ctx, out, operand)
    }

    fn write_operand<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        operand: &'a Operand,
    ) -> Result<()> {
        match operand {
            Operand::Value(value) => ctx.encode(out, value.clone())?,
            Operand::Column(column) => self.write_column(ctx, out, column)?,
            Operand::Raw(fragment) => ctx.splice_raw(out, fragment)?,
            Operand::Subquery(sub) => {
                out.push('(');
                self.as_dyn().write_select(ctx, out, sub)?;
                out.push(')');
            }
        }
        Ok(())
    }

    /// Render one INSERT statement for `rows` (a slice of the descriptor's
    /// rows, so batch splitting can reuse this per chunk). Nested creates
    /// found in the rows are hoisted into a WITH chain, dependencies first,
    /// and the referencing cell becomes a scalar select from the CTE.
    fn write_insert_statement<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        insert: &'a InsertDescriptor,
        rows: &'a [Vec<InsertValue>],
    ) -> Result<()> {
        let mut hoisted: Vec<(&'a InsertDescriptor, String)> = Vec::new();
        collect_nested(rows, &mut hoisted);
        if !hoisted.is_empty() {
            out.push_str("WITH ");
            try_separated_by(
                out,
                hoisted.iter(),
                |out, (nested, name)| {
                    self.write_identifier_quoted(out, name);
                    out.push_str(" AS (");
                    self.write_insert_body(ctx, out, nested, &nested.rows, &hoisted)?;
                    out.push_str(" RETURNING *)");
                    Ok(())
                },
                ", ",
            )?;
            out.push('\n');
        }
        self.write_insert_body(ctx, out, insert, rows, &hoisted)?;
        self.write_returning(out, &insert.returning, &insert.shape)?;
        Ok(())
    }

    fn write_insert_body<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        insert: &'a InsertDescriptor,
        rows: &'a [Vec<InsertValue>],
        hoisted: &[(&'a InsertDescriptor, String)],
    ) -> Result<()> {
        ctx.descend()?;
        out.push_str("INSERT INTO ");
        self.write_table_ref(out, &insert.table, false);
        out.push_str(" (");
        try_separated_by(
            out,
            &insert.columns,
            |out, key| {
                let entry = insert.shape.by_key(key).ok_or_else(|| {
                    compile_error(format!(
                        "insert column `{}` does not exist in the shape of `{}`",
                        key, insert.table.name
                    ))
                })?;
                self.write_identifier_quoted(out, &entry.column);
                Ok(())
            },
            ", ",
        )?;
        out.push_str(") VALUES\n");
        try_separated_by(
            out,
            rows,
            |out, row| {
                if row.len() != insert.columns.len() {
                    return Err(compile_error(format!(
                        "insert row has {} cells for {} columns",
                        row.len(),
                        insert.columns.len()
                    )));
                }
                out.push('(');
                try_separated_by(
                    out,
                    row.iter().enumerate(),
                    |out, (i, cell)| self.write_insert_cell(ctx, out, insert, i, cell, hoisted),
                    ", ",
                )?;
                out.push(')');
                Ok(())
            },
            ",\n",
        )?;
        self.write_conflict_clause(ctx, out, insert)?;
        ctx.ascend();
        Ok(())
    }

    fn write_insert_cell<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        insert: &'a InsertDescriptor,
        index: usize,
        cell: &'a InsertValue,
        hoisted: &[(&'a InsertDescriptor, String)],
    ) -> Result<()> {
        match cell {
            InsertValue::Default => out.push_str("DEFAULT"),
            InsertValue::Value(value) => {
                let encoded = encode_cell(insert, index, value.clone())?;
                ctx.encode(out, encoded)?;
            }
            InsertValue::Raw(fragment) => ctx.splice_raw(out, fragment)?,
            InsertValue::Nested { insert: nested, select } => {
                let name = hoisted
                    .iter()
                    .find(|(descriptor, _)| std::ptr::eq(*descriptor, nested.as_ref()))
                    .map(|(_, name)| name)
                    .ok_or_else(|| compile_error("nested create was not hoisted"))?;
                let entry = nested.shape.by_key(select).ok_or_else(|| {
                    compile_error(format!(
                        "nested create does not expose column `{}`",
                        select
                    ))
                })?;
                out.push_str("(SELECT ");
                self.write_identifier_quoted(out, &entry.column);
                out.push_str(" FROM ");
                self.write_identifier_quoted(out, name);
                out.push(')');
            }
        }
        Ok(())
    }

    fn write_conflict_clause<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        insert: &'a InsertDescriptor,
    ) -> Result<()> {
        let Some(conflict) = &insert.on_conflict else {
            return Ok(());
        };
        out.push_str("\nON CONFLICT (");
        try_separated_by(
            out,
            &conflict.target,
            |out, key| {
                let entry = insert.shape.by_key(key).ok_or_else(|| {
                    compile_error(format!("conflict target `{}` is not a known column", key))
                })?;
                self.write_identifier_quoted(out, &entry.column);
                Ok(())
            },
            ", ",
        )?;
        out.push(')');
        match &conflict.action {
            ConflictAction::DoNothing => out.push_str(" DO NOTHING"),
            ConflictAction::DoUpdate(assignments) => {
                out.push_str(" DO UPDATE SET ");
                try_separated_by(
                    out,
                    assignments,
                    |out, (key, value)| {
                        let entry = insert.shape.by_key(key).ok_or_else(|| {
                            compile_error(format!(
                                "conflict assignment `{}` is not a known column",
                                key
                            ))
                        })?;
                        self.write_identifier_quoted(out, &entry.column);
                        out.push_str(" = ");
                        self.write_set_value(ctx, out, &entry.column, value)
                    },
                    ", ",
                )?;
            }
            // Merge shorthand: every proposed non-target column takes the
            // excluded value. SQL requires at least one assignment, so an
            // all-target insert degrades to a self-referential no-op SET.
            ConflictAction::Merge => {
                out.push_str(" DO UPDATE SET ");
                let merged: Vec<_> = insert
                    .columns
                    .iter()
                    .filter(|key| !conflict.target.contains(key))
                    .collect();
                if merged.is_empty() {
                    let key = conflict.target.first().ok_or_else(|| {
                        compile_error("conflict merge requires at least one target column")
                    })?;
                    let entry = insert.shape.by_key(key).ok_or_else(|| {
                        compile_error(format!("conflict target `{}` is not a known column", key))
                    })?;
                    self.write_identifier_quoted(out, &entry.column);
                    out.push_str(" = ");
                    self.write_identifier_quoted(out, &insert.table.name);
                    out.push('.');
                    self.write_identifier_quoted(out, &entry.column);
                } else {
                    try_separated_by(
                        out,
                        merged,
                        |out, key| {
                            let entry = insert.shape.by_key(key).ok_or_else(|| {
                                compile_error(format!(
                                    "insert column `{}` is not a known column",
                                    key
                                ))
                            })?;
                            self.write_identifier_quoted(out, &entry.column);
                            out.push_str(" = EXCLUDED.");
                            self.write_identifier_quoted(out, &entry.column);
                            Ok(())
                        },
                        ", ",
                    )?;
                }
            }
        }
        Ok(())
    }

    fn write_set_value<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        column: &str,
        value: &'a SetValue,
    ) -> Result<()> {
        match value {
            SetValue::Value(v) => ctx.encode(out, v.clone())?,
            SetValue::Raw(fragment) => ctx.splice_raw(out, fragment)?,
            SetValue::JsonSet { path, value } => {
                out.push_str("jsonb_set(");
                self.write_identifier_quoted(out, column);
                out.push_str(", ");
                ctx.encode(out, text_array(path))?;
                out.push_str(", ");
                ctx.encode(out, value.clone())?;
                out.push(')');
            }
            SetValue::JsonInsert { path, value } => {
                out.push_str("jsonb_insert(");
                self.write_identifier_quoted(out, column);
                out.push_str(", ");
                ctx.encode(out, text_array(path))?;
                out.push_str(", ");
                ctx.encode(out, value.clone())?;
                out.push(')');
            }
            SetValue::JsonRemove { path } => {
                self.write_identifier_quoted(out, column);
                out.push_str(" #- ");
                ctx.encode(out, text_array(path))?;
            }
        }
        Ok(())
    }

    fn write_update<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        update: &'a UpdateDescriptor,
    ) -> Result<()> {
        ctx.descend()?;
        ctx.push_frame();
        ctx.add_source(
            update.table.reference_name(),
            update.table.reference_name(),
            &update.shape,
        );
        out.push_str("UPDATE ");
        self.write_table_ref(out, &update.table, true);
        out.push_str(" SET ");
        try_separated_by(
            out,
            &update.set,
            |out, (key, value)| {
                let entry = update.shape.by_key(key).ok_or_else(|| {
                    compile_error(format!(
                        "update column `{}` does not exist in the shape of `{}`",
                        key, update.table.name
                    ))
                })?;
                self.write_identifier_quoted(out, &entry.column);
                out.push_str(" = ");
                self.write_set_value(ctx, out, &entry.column, value)
            },
            ", ",
        )?;
        if let Some(filter) = &update.filter {
            out.push_str("\nWHERE ");
            self.write_predicate(ctx, out, filter)?;
        }
        self.write_returning(out, &update.returning, &update.shape)?;
        ctx.pop_frame();
        ctx.ascend();
        Ok(())
    }

    fn write_delete<'a>(
        &self,
        ctx: &mut Context<'a>,
        out: &mut String,
        delete: &'a DeleteDescriptor,
    ) -> Result<()> {
        ctx.descend()?;
        ctx.push_frame();
        ctx.add_source(
            delete.table.reference_name(),
            delete.table.reference_name(),
            &delete.shape,
        );
        out.push_str("DELETE FROM ");
        self.write_table_ref(out, &delete.table, true);
        if let Some(filter) = &delete.filter {
            out.push_str("\nWHERE ");
            self.write_predicate(ctx, out, filter)?;
        }
        self.write_returning(out, &delete.returning, &delete.shape)?;
        ctx.pop_frame();
        ctx.ascend();
        Ok(())
    }

    fn write_returning(&self, out: &mut String, returning: &Returning, shape: &Shape) -> Result<()> {
        match returning {
            Returning::None => {}
            Returning::All => out.push_str("\nRETURNING *"),
            Returning::Columns(keys) => {
                out.push_str("\nRETURNING ");
                try_separated_by(
                    out,
                    keys,
                    |out, key| {
                        let entry = shape.by_key(key).ok_or_else(|| {
                            compile_error(format!("returning column `{}` is not known", key))
                        })?;
                        self.write_identifier_quoted(out, &entry.column);
                        Ok(())
                    },
                    ", ",
                )?;
            }
        }
        Ok(())
    }
}

/// Binds a JSON path as a `text[]` parameter.
fn text_array(path: &[String]) -> Value {
    Value::List(
        Some(
            path.iter()
                .map(|segment| Value::Varchar(Some(segment.clone())))
                .collect(),
        ),
        Box::new(Value::Varchar(None)),
    )
}

/// Applies the column's encode codec before binding, when the shape has one.
fn encode_cell(insert: &InsertDescriptor, index: usize, value: Value) -> Result<Value> {
    let key = &insert.columns[index];
    let entry = insert.shape.by_key(key).ok_or_else(|| {
        compile_error(format!(
            "insert column `{}` does not exist in the shape of `{}`",
            key, insert.table.name
        ))
    })?;
    match entry.encode {
        Some(encode) => encode(value),
        None => Ok(value),
    }
}

/// Collects nested creates in dependency order (deepest first) and assigns
/// their CTE names.
fn collect_nested<'a>(
    rows: &'a [Vec<InsertValue>],
    hoisted: &mut Vec<(&'a InsertDescriptor, String)>,
) {
    for row in rows {
        for cell in row {
            if let InsertValue::Nested { insert, .. } = cell {
                collect_nested(&insert.rows, hoisted);
                let name = format!("ins_{}", hoisted.len());
                hoisted.push((insert.as_ref(), name));
            }
        }
    }
}

/// Compiles one read query into SQL text plus its ordered parameters.
pub fn compile_select(
    writer: &dyn SqlWriter,
    query: &QueryDescriptor,
    options: CompileOptions,
) -> Result<CompiledSql> {
    let mut ctx = Context::new(options);
    let mut text = String::with_capacity(1024);
    writer.write_select(&mut ctx, &mut text, query)?;
    log::trace!("compiled select with {} parameters:\n{}", ctx.params.len(), text);
    Ok(CompiledSql::new(text, ctx.params))
}

/// Writer emitting the generic dialect the core targets.
pub struct GenericSqlWriter;

impl GenericSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
