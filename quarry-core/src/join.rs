use crate::{
    ColumnRef, Context, Operand, Predicate, QueryDescriptor, Result, SelectItem, Shape, SqlWriter,
    TableRef, Value, compile_error,
};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// What a join attaches: a plain relation, a previously declared CTE, or an
/// explicit sub-query.
#[derive(Debug, Clone)]
pub enum JoinTarget {
    Table(TableRef),
    Cte(Cow<'static, str>),
    Subquery(Box<QueryDescriptor>),
}

/// One join of a [`QueryDescriptor`]. `shape` is the output shape the joined
/// source exposes; for tables and CTEs the builder layer passes the declaring
/// source's shape through, so entries stay shared rather than re-owned.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub target: JoinTarget,
    pub alias: Cow<'static, str>,
    pub on: Option<Predicate>,
    pub shape: Shape,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, target: JoinTarget, shape: Shape) -> Self {
        Self {
            kind,
            target,
            alias: Cow::Borrowed(""),
            on: None,
            shape,
        }
    }

    pub fn alias(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn on(mut self, on: Predicate) -> Self {
        self.on = Some(on);
        self
    }

    /// The name predicates and select items refer to this source by.
    pub fn reference_name(&self) -> &str {
        if !self.alias.is_empty() {
            return &self.alias;
        }
        match &self.target {
            JoinTarget::Table(table) => table.reference_name(),
            JoinTarget::Cte(name) => name,
            JoinTarget::Subquery(..) => "",
        }
    }

    fn target_key(&self) -> String {
        match &self.target {
            JoinTarget::Table(table) => format!("{}.{}", table.schema, table.name),
            JoinTarget::Cte(name) => name.to_string(),
            JoinTarget::Subquery(..) => String::new(),
        }
    }
}

/// How a join target compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinClass {
    /// Bare table or CTE with a static ON condition.
    Trivial,
    /// Carries its own selection/filter/limit or binds values.
    Computed,
    /// Sub-query body references outer-query columns.
    Lateral,
}

/// A join after classification and deduplication, ready for emission.
#[derive(Debug)]
pub struct ResolvedJoin<'a> {
    pub spec: &'a JoinSpec,
    pub class: JoinClass,
    /// Alias emitted into SQL; differs from the requested alias when the
    /// join was merged into an earlier identical lateral.
    pub rendered_alias: &'a str,
    /// False when an identical earlier join already covers this one.
    pub emit: bool,
}

/// Classifies, deduplicates and registers the joins of one query.
///
/// Every surviving source is made visible in the current scope frame before
/// this returns, so select items and predicates compiled afterwards resolve
/// against the joined shapes. Emission happens later, in text order, so
/// placeholder numbering stays aligned with the final statement.
pub fn resolve_joins<'a>(
    writer: &dyn SqlWriter,
    ctx: &mut Context<'a>,
    joins: &'a [JoinSpec],
) -> Result<Vec<ResolvedJoin<'a>>> {
    let mut resolved: Vec<ResolvedJoin<'a>> = Vec::with_capacity(joins.len());
    let mut trivial_seen: Vec<(String, String, &'static str, String)> = Vec::new();
    let mut lateral_seen: Vec<(String, Vec<Value>, &'a str)> = Vec::new();
    for spec in joins {
        let class = classify(ctx, spec);
        let alias = spec.reference_name();
        if alias.is_empty() {
            return Err(compile_error(
                "a sub-query join requires an explicit alias",
            ));
        }
        match class {
            JoinClass::Trivial => {
                ctx.add_source(alias, alias, &spec.shape);
                let before = ctx.params.len();
                let mut on_text = String::new();
                if let Some(on) = &spec.on {
                    writer.write_predicate(ctx, &mut on_text, on)?;
                }
                if ctx.params.len() > before {
                    // The ON condition bound something after all; demote to
                    // computed so it is never deduplicated.
                    ctx.params.truncate(before);
                    resolved.push(ResolvedJoin {
                        spec,
                        class: JoinClass::Computed,
                        rendered_alias: alias,
                        emit: true,
                    });
                    continue;
                }
                let key = (
                    spec.target_key(),
                    alias.to_string(),
                    spec.kind.sql(),
                    on_text,
                );
                let emit = !trivial_seen.contains(&key);
                if emit {
                    trivial_seen.push(key);
                }
                resolved.push(ResolvedJoin {
                    spec,
                    class,
                    rendered_alias: alias,
                    emit,
                });
            }
            JoinClass::Computed => {
                ctx.add_source(alias, alias, &spec.shape);
                resolved.push(ResolvedJoin {
                    spec,
                    class,
                    rendered_alias: alias,
                    emit: true,
                });
            }
            JoinClass::Lateral => {
                let JoinTarget::Subquery(sub) = &spec.target else {
                    unreachable!("only sub-query targets classify as lateral");
                };
                // Scratch-compile the body to decide merging; the bound
                // parameters are rolled back and re-bound at emission time.
                let before = ctx.params.len();
                let mut body = String::new();
                writer.write_select(ctx, &mut body, sub)?;
                let bound = ctx.params.split_off(before);
                let single_value = sub.columns.len() == 1
                    && !matches!(sub.columns[0], SelectItem::All | SelectItem::AllFrom(..));
                let merged = single_value
                    .then(|| {
                        lateral_seen
                            .iter()
                            .find(|(text, params, _)| *text == body && *params == bound)
                            .map(|(.., canonical)| *canonical)
                    })
                    .flatten();
                if let Some(canonical) = merged {
                    ctx.add_source(alias, canonical, &spec.shape);
                    resolved.push(ResolvedJoin {
                        spec,
                        class,
                        rendered_alias: canonical,
                        emit: false,
                    });
                } else {
                    if single_value {
                        lateral_seen.push((body, bound, alias));
                    }
                    ctx.add_source(alias, alias, &spec.shape);
                    resolved.push(ResolvedJoin {
                        spec,
                        class,
                        rendered_alias: alias,
                        emit: true,
                    });
                }
            }
        }
    }
    Ok(resolved)
}

fn classify(ctx: &Context, spec: &JoinSpec) -> JoinClass {
    match &spec.target {
        JoinTarget::Subquery(sub) => {
            let visible = ctx.visible_aliases();
            if query_references(sub, &visible) {
                JoinClass::Lateral
            } else {
                JoinClass::Computed
            }
        }
        JoinTarget::Table(..) | JoinTarget::Cte(..) => {
            if spec.on.as_ref().is_some_and(Predicate::has_dynamic_values) {
                JoinClass::Computed
            } else {
                JoinClass::Trivial
            }
        }
    }
}

/// True when `query` (or anything nested in it) references a column
/// qualified with one of `outer`'s aliases that its own sources do not
/// shadow.
fn query_references(query: &QueryDescriptor, outer: &[&str]) -> bool {
    let own: Vec<&str> = std::iter::once(query.table.reference_name())
        .chain(query.joins.iter().map(JoinSpec::reference_name))
        .collect();
    let visible: Vec<&str> = outer
        .iter()
        .copied()
        .filter(|alias| !own.contains(alias))
        .collect();
    let foreign = |column: &ColumnRef| {
        !column.table.is_empty()
            && !own.contains(&column.table.as_ref())
            && visible.contains(&column.table.as_ref())
    };
    query.columns.iter().any(|item| match item {
        SelectItem::Column(column) => foreign(column),
        SelectItem::AllFrom(alias) => {
            !own.contains(&alias.as_ref()) && visible.contains(&alias.as_ref())
        }
        _ => false,
    }) || query
        .filter
        .as_ref()
        .is_some_and(|p| predicate_references(p, &foreign, &visible))
        || query.joins.iter().any(|join| {
            join.on
                .as_ref()
                .is_some_and(|p| predicate_references(p, &foreign, &visible))
                || matches!(&join.target, JoinTarget::Subquery(sub) if query_references(sub, &visible))
        })
        || query.group_by.iter().any(|c| foreign(c))
        || query.order_by.iter().any(|o| foreign(&o.column))
}

fn predicate_references(
    predicate: &Predicate,
    foreign: &impl Fn(&ColumnRef) -> bool,
    visible: &[&str],
) -> bool {
    match predicate {
        Predicate::And(branches) | Predicate::Or(branches) => branches
            .iter()
            .any(|p| predicate_references(p, foreign, visible)),
        Predicate::Not(inner) => predicate_references(inner, foreign, visible),
        Predicate::Raw(..) => false,
        Predicate::Compare { target, op } => {
            foreign(target)
                || op.operands().any(|operand| match operand {
                    Operand::Column(column) => foreign(column),
                    Operand::Subquery(sub) => query_references(sub, visible),
                    _ => false,
                })
        }
    }
}
