use serde::{Deserialize, Serialize};

/// Comparison operator of a rule condition
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = ">=")]
    Gte,
    #[serde(alias = "<=")]
    Lte,
}

impl Operator {
    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Gte => lhs >= rhs,
            Self::Lte => lhs <= rhs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        assert!(Operator::Eq.apply(1.0, 1.0));
        assert!(!Operator::Eq.apply(1.0, 1.1));
        assert!(Operator::Gt.apply(2.0, 1.0));
        assert!(Operator::Lt.apply(1.0, 2.0));
        assert!(Operator::Gte.apply(2.0, 2.0));
        assert!(Operator::Lte.apply(2.0, 2.0));
        assert!(!Operator::Lte.apply(2.1, 2.0));
    }

    #[test]
    fn test_symbol_aliases() {
        let op: Operator = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, Operator::Gte);
        let op: Operator = serde_json::from_str("\"lt\"").unwrap();
        assert_eq!(op, Operator::Lt);
        assert!(serde_json::from_str::<Operator>("\"ne\"").is_err());
    }
}
