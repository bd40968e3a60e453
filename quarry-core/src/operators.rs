use crate::{Comparison, ValueCategory};

/// Families the predicate operators are grouped into. Availability per
/// column is a static property of the column's value category; the builder
/// layer consults [`families_for`] when it resolves capabilities, so the
/// compiler itself never re-checks compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorFamily {
    Equality,
    Ordering,
    Membership,
    Pattern,
    Array,
    Json,
}

/// Operator families available for a value category, as a fixed lookup
/// table. Closed by construction: extending it means extending the enums,
/// not registering dispatch at runtime.
pub fn families_for(category: ValueCategory) -> &'static [OperatorFamily] {
    use OperatorFamily::*;
    match category {
        ValueCategory::Boolean => &[Equality, Membership],
        ValueCategory::Numeric | ValueCategory::Temporal => &[Equality, Ordering, Membership],
        ValueCategory::OrdinalText => &[Equality, Ordering, Membership, Pattern],
        ValueCategory::Binary | ValueCategory::Uuid => &[Equality, Membership],
        ValueCategory::Json => &[Equality, Json],
        ValueCategory::Array => &[Equality, Array],
    }
}

impl Comparison {
    pub fn family(&self) -> OperatorFamily {
        use Comparison::*;
        match self {
            Equal(..) | NotEqual(..) => OperatorFamily::Equality,
            Less(..) | LessEqual(..) | Greater(..) | GreaterEqual(..) | Between(..) => {
                OperatorFamily::Ordering
            }
            In(..) | NotIn(..) => OperatorFamily::Membership,
            Like(..) | NotLike(..) | ILike(..) | NotILike(..) => OperatorFamily::Pattern,
            ArrayContains(..) | ArrayContainedBy(..) | ArrayOverlaps(..) | ArrayLength(..) => {
                OperatorFamily::Array
            }
            JsonContains(..) | JsonPathEquals(..) => OperatorFamily::Json,
        }
    }
}
