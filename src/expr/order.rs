//! Sort keys for `ORDER BY`

use super::Node;

/// Sort direction for ordering results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Ascending order (A-Z, 1-9)
    #[default]
    Asc,
    /// Descending order (Z-A, 9-1)
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Where NULLs sort relative to other values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullHandling {
    /// SQLite default: NULLs sort as the smallest value
    #[default]
    Default,
    NullsFirst,
    NullsLast,
}

impl NullHandling {
    pub fn to_sql(&self) -> Option<&'static str> {
        match self {
            NullHandling::Default => None,
            NullHandling::NullsFirst => Some("NULLS FIRST"),
            NullHandling::NullsLast => Some("NULLS LAST"),
        }
    }
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpecifier {
    pub node: Node,
    pub direction: OrderDirection,
    pub nulls: NullHandling,
}

impl OrderSpecifier {
    pub fn new(node: Node, direction: OrderDirection) -> Self {
        Self {
            node,
            direction,
            nulls: NullHandling::Default,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = NullHandling::NullsFirst;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = NullHandling::NullsLast;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExpressionExt;
    use crate::sample::QMember;

    #[test]
    fn test_direction_sql() {
        assert_eq!(OrderDirection::Asc.to_sql(), "ASC");
        assert_eq!(OrderDirection::Desc.to_sql(), "DESC");
        assert_eq!(OrderDirection::default(), OrderDirection::Asc);
    }

    #[test]
    fn test_null_ordering() {
        let m = QMember::new("m");
        let order = m.username.asc().nulls_last();
        assert_eq!(order.direction, OrderDirection::Asc);
        assert_eq!(order.nulls.to_sql(), Some("NULLS LAST"));
        assert_eq!(m.age.desc().nulls.to_sql(), None);
    }
}
