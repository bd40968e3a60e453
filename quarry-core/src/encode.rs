use crate::{ColumnRef, RawFragment, Result, Shape, ShapeEntry, Value, compile_error};
use std::fmt::Write;

/// Knobs the adapter threads into compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Protocol ceiling on bound parameters per statement; oversized bulk
    /// mutations are split to stay under it.
    pub max_params: usize,
    /// Bound on nested sub-query compilation depth.
    pub max_depth: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            // Bind messages carry an Int16 parameter count.
            max_params: 65535,
            max_depth: 32,
        }
    }
}

/// One relation visible to column resolution: the alias callers use, the
/// alias actually rendered (they differ when a lateral join was merged), and
/// the shape borrowed from the declaring source.
#[derive(Debug, Clone, Copy)]
pub struct ScopeSource<'a> {
    pub alias: &'a str,
    pub rendered: &'a str,
    pub shape: &'a Shape,
}

/// A column reference resolved against the scope.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedColumn<'a> {
    pub qualifier: &'a str,
    pub entry: &'a ShapeEntry,
    /// Resolution landed in an enclosing query's frame (correlated use).
    pub outer: bool,
}

/// Mutable state threaded through one compilation: the parameter array,
/// the visible scopes, and the recursion budget.
///
/// Placeholders are numbered by parameter-array position, so rendering
/// left-to-right keeps text order and parameter order identical by
/// construction.
pub struct Context<'a> {
    pub params: Vec<Value>,
    pub options: CompileOptions,
    pub qualify_columns: bool,
    depth: u32,
    frames: Vec<Vec<ScopeSource<'a>>>,
    ctes: Vec<(&'a str, &'a Shape)>,
}

impl<'a> Context<'a> {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            params: Vec::new(),
            options,
            qualify_columns: false,
            depth: 0,
            frames: Vec::new(),
            ctes: Vec::new(),
        }
    }

    /// Appends `value` to the parameter array and renders its placeholder.
    /// JSON values keep an explicit cast so the backend never has to guess
    /// the parameter type from context.
    pub fn encode(&mut self, out: &mut String, value: Value) -> Result<()> {
        let suffix = match &value {
            Value::Json(..) => "::jsonb",
            Value::List(_, prototype) => {
                if matches!(prototype.as_ref(), Value::List(..) | Value::Json(..)) {
                    return Err(compile_error(format!(
                        "cannot bind a list of {:?} values",
                        prototype
                    )));
                }
                ""
            }
            _ => "",
        };
        self.params.push(value);
        let _ = write!(out, "${}{}", self.params.len(), suffix);
        Ok(())
    }

    /// Splices a pre-escaped fragment, renumbering its `?` markers into
    /// `$n` placeholders and appending its parameters in order.
    pub fn splice_raw(&mut self, out: &mut String, fragment: &RawFragment) -> Result<()> {
        let markers = fragment.sql.matches('?').count();
        if markers != fragment.params.len() {
            return Err(compile_error(format!(
                "raw fragment `{}` has {} placeholder markers but {} parameters",
                fragment.sql,
                markers,
                fragment.params.len()
            )));
        }
        let mut params = fragment.params.iter();
        let mut position = 0;
        for (i, c) in fragment.sql.char_indices() {
            if c == '?' {
                out.push_str(&fragment.sql[position..i]);
                let value = params.next().cloned().unwrap_or_default();
                self.encode(out, value)?;
                position = i + 1;
            }
        }
        out.push_str(&fragment.sql[position..]);
        Ok(())
    }

    /// Enters a nested compilation, failing once the depth budget is spent
    /// so cyclic descriptors surface as a compile error instead of unbounded
    /// recursion.
    pub fn descend(&mut self) -> Result<()> {
        if self.depth >= self.options.max_depth {
            return Err(compile_error(format!(
                "query nesting exceeds {} levels; the descriptor likely references itself",
                self.options.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn ascend(&mut self) {
        self.depth -= 1;
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Vec::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Makes `shape` visible under `alias` in the innermost frame.
    /// `rendered` is the alias emitted into SQL; it differs from `alias`
    /// when a merged lateral join funnels several requested aliases through
    /// one join clause.
    pub fn add_source(&mut self, alias: &'a str, rendered: &'a str, shape: &'a Shape) {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(ScopeSource {
                alias,
                rendered,
                shape,
            });
        }
    }

    pub fn register_cte(&mut self, name: &'a str, shape: &'a Shape) {
        self.ctes.push((name, shape));
    }

    pub fn cte_shape(&self, name: &str) -> Option<&'a Shape> {
        self.ctes
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, shape)| *shape)
    }

    /// Maps a caller-facing alias to the alias actually emitted into SQL.
    pub fn rendered_alias(&self, alias: &str) -> Option<&'a str> {
        self.frames.iter().rev().find_map(|frame| {
            frame
                .iter()
                .find(|source| source.alias == alias)
                .map(|source| source.rendered)
        })
    }

    /// Every alias currently visible, outer frames included. Lateral-join
    /// classification checks a sub-query body against this set.
    pub fn visible_aliases(&self) -> Vec<&'a str> {
        self.frames
            .iter()
            .flat_map(|frame| frame.iter().map(|source| source.alias))
            .collect()
    }

    /// Resolves a column reference, innermost frame first. An unqualified
    /// name matching several sources of the same frame is ambiguous and
    /// fails; qualified names must name a visible alias.
    pub fn resolve(&self, column: &ColumnRef) -> Result<ResolvedColumn<'a>> {
        let innermost = self.frames.len().saturating_sub(1);
        for (level, frame) in self.frames.iter().enumerate().rev() {
            let outer = level < innermost;
            if !column.table.is_empty() {
                if let Some(source) = frame.iter().find(|s| s.alias == column.table) {
                    let entry = source.shape.by_key(&column.name).ok_or_else(|| {
                        compile_error(format!(
                            "column `{}` does not exist in the shape of `{}`",
                            column.name, column.table
                        ))
                    })?;
                    return Ok(ResolvedColumn {
                        qualifier: source.rendered,
                        entry,
                        outer,
                    });
                }
                continue;
            }
            let mut matches = frame
                .iter()
                .filter_map(|s| s.shape.by_key(&column.name).map(|entry| (s, entry)));
            if let Some((source, entry)) = matches.next() {
                if matches.next().is_some() {
                    return Err(compile_error(format!(
                        "column `{}` is ambiguous; qualify it with a source alias",
                        column.name
                    )));
                }
                return Ok(ResolvedColumn {
                    qualifier: source.rendered,
                    entry,
                    outer,
                });
            }
        }
        Err(compile_error(format!(
            "column `{}{}{}` does not resolve against any visible source",
            column.table,
            if column.table.is_empty() { "" } else { "." },
            column.name
        )))
    }
}
