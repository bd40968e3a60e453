use crate::{ColumnRef, JoinSpec, Predicate, RawFragment, Shape, TableRef};
use std::borrow::Cow;

/// One entry of the select list.
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// `*`
    All,
    /// `alias.*`
    AllFrom(Cow<'static, str>),
    Column(ColumnRef),
    /// Pre-escaped expression with an output alias.
    Raw {
        fragment: RawFragment,
        alias: Cow<'static, str>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub direction: Direction,
}

/// A named common table expression. `shape` is the output shape the CTE
/// exposes to referencing queries, resolved by the builder layer.
#[derive(Debug, Clone)]
pub struct Cte {
    pub name: Cow<'static, str>,
    pub query: QueryDescriptor,
    pub shape: Shape,
}

/// Tree describing one logical read query.
///
/// Invariant: every column reference in the tree resolves against the shape
/// of its owning table, join or CTE at compile time, or compilation fails.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    pub table: TableRef,
    /// Shape of the target relation.
    pub shape: Shape,
    /// CTEs in declaration order; later entries may reference earlier ones.
    pub ctes: Vec<Cte>,
    pub columns: Vec<SelectItem>,
    pub filter: Option<Predicate>,
    pub joins: Vec<JoinSpec>,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub distinct: bool,
}

impl QueryDescriptor {
    pub fn new(table: TableRef, shape: Shape) -> Self {
        Self {
            table,
            shape,
            ctes: Vec::new(),
            columns: vec![SelectItem::All],
            filter: None,
            joins: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = SelectItem>) -> Self {
        self.columns = columns.into_iter().collect();
        self
    }

    pub fn filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    pub fn cte(mut self, cte: Cte) -> Self {
        self.ctes.push(cte);
        self
    }

    pub fn order_by(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.order_by.push(OrderBy { column, direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}
