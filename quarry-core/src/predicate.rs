use crate::{ColumnRef, QueryDescriptor, Value};
use std::borrow::Cow;

/// A pre-escaped SQL fragment contributed by the collaborator layer.
///
/// `?` markers in `sql` stand for the entries of `params` in order; the
/// encoder renumbers them into `$n` placeholders when the fragment is
/// spliced into a statement. Marker and parameter counts must match.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    pub sql: Cow<'static, str>,
    pub params: Vec<Value>,
}

impl RawFragment {
    pub fn new(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Column(ColumnRef),
    Raw(RawFragment),
    /// A read query compiled recursively as a correlated scalar sub-query.
    Subquery(Box<QueryDescriptor>),
}

impl Operand {
    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }

    pub fn null() -> Self {
        Operand::Value(Value::Null)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

/// Plain comparison verb used where an operator family needs a direction,
/// e.g. array length predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Equal => "=",
            CompareOp::NotEqual => "<>",
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
        }
    }
}

/// The closed set of predicate operators, grouped by family.
///
/// Operator/column compatibility is validated by the builder layer before a
/// descriptor reaches the compiler; rendering does not re-check it.
#[derive(Debug, Clone)]
pub enum Comparison {
    // Equality. A null operand renders IS [NOT] NULL.
    Equal(Operand),
    NotEqual(Operand),
    // Ordering.
    Less(Operand),
    LessEqual(Operand),
    Greater(Operand),
    GreaterEqual(Operand),
    Between(Operand, Operand),
    // Membership over a list-typed operand.
    In(Operand),
    NotIn(Operand),
    // Text patterns.
    Like(Operand),
    NotLike(Operand),
    ILike(Operand),
    NotILike(Operand),
    // Arrays.
    ArrayContains(Operand),
    ArrayContainedBy(Operand),
    ArrayOverlaps(Operand),
    /// Compares the array length, coalescing NULL (empty/absent array) to 0.
    ArrayLength(CompareOp, Operand),
    // JSON.
    JsonContains(Operand),
    /// Compares the text extracted at `path` (`#>> path`) to the operand.
    JsonPathEquals(Vec<String>, Operand),
}

/// Boolean predicate tree over comparisons and raw fragments.
#[derive(Debug, Clone)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        target: ColumnRef,
        op: Comparison,
    },
    Raw(RawFragment),
}

impl Predicate {
    pub fn compare(target: ColumnRef, op: Comparison) -> Self {
        Predicate::Compare { target, op }
    }

    pub fn and(branches: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(branches.into_iter().collect())
    }

    pub fn or(branches: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(branches.into_iter().collect())
    }

    pub fn not(inner: Predicate) -> Self {
        Predicate::Not(Box::new(inner))
    }

    /// True when rendering this tree would bind at least one parameter.
    pub fn has_dynamic_values(&self) -> bool {
        match self {
            Predicate::And(branches) | Predicate::Or(branches) => {
                branches.iter().any(Predicate::has_dynamic_values)
            }
            Predicate::Not(inner) => inner.has_dynamic_values(),
            Predicate::Raw(raw) => !raw.params.is_empty(),
            Predicate::Compare { op, .. } => op.binds_parameters(),
        }
    }
}

fn operand_binds(operand: &Operand) -> bool {
    match operand {
        Operand::Value(..) => true,
        Operand::Column(..) => false,
        Operand::Raw(raw) => !raw.params.is_empty(),
        Operand::Subquery(..) => true,
    }
}

impl Comparison {
    /// True when rendering this comparison appends to the parameter array.
    /// Null equality renders `IS [NOT] NULL` without binding; a JSON path
    /// always binds its path parameter.
    pub fn binds_parameters(&self) -> bool {
        match self {
            Comparison::Equal(Operand::Value(v)) | Comparison::NotEqual(Operand::Value(v))
                if v.is_null() =>
            {
                false
            }
            Comparison::JsonPathEquals(..) => true,
            _ => self.operands().any(operand_binds),
        }
    }

    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        use Comparison::*;
        let (first, second): (&Operand, Option<&Operand>) = match self {
            Equal(v) | NotEqual(v) | Less(v) | LessEqual(v) | Greater(v) | GreaterEqual(v)
            | In(v) | NotIn(v) | Like(v) | NotLike(v) | ILike(v) | NotILike(v)
            | ArrayContains(v) | ArrayContainedBy(v) | ArrayOverlaps(v) | ArrayLength(_, v)
            | JsonContains(v) | JsonPathEquals(_, v) => (v, None),
            Between(low, high) => (low, Some(high)),
        };
        std::iter::once(first).chain(second)
    }
}
