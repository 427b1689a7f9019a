//! Read operations the controller can route through (or around) the default scope

use crate::error::SoftDeleteError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of a read, independent of its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadKind {
    Find,
    All,
    First,
    Count,
    Sum,
    Average,
    Minimum,
    Maximum,
    Calculate,
    Exists,
}

impl ReadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadKind::Find => "find",
            ReadKind::All => "all",
            ReadKind::First => "first",
            ReadKind::Count => "count",
            ReadKind::Sum => "sum",
            ReadKind::Average => "average",
            ReadKind::Minimum => "minimum",
            ReadKind::Maximum => "maximum",
            ReadKind::Calculate => "calculate",
            ReadKind::Exists => "exists",
        }
    }
}

impl fmt::Display for ReadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadKind {
    type Err = SoftDeleteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "find" => Ok(ReadKind::Find),
            "all" => Ok(ReadKind::All),
            "first" => Ok(ReadKind::First),
            "count" => Ok(ReadKind::Count),
            "sum" => Ok(ReadKind::Sum),
            "average" => Ok(ReadKind::Average),
            "minimum" => Ok(ReadKind::Minimum),
            "maximum" => Ok(ReadKind::Maximum),
            "calculate" => Ok(ReadKind::Calculate),
            "exists" => Ok(ReadKind::Exists),
            other => Err(SoftDeleteError::UnsupportedOperation {
                operation: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Average,
    Minimum,
    Maximum,
}

impl AggregateFunction {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Average => "AVG",
            AggregateFunction::Minimum => "MIN",
            AggregateFunction::Maximum => "MAX",
        }
    }
}

/// A read request: point lookup, bulk fetch or aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOperation {
    Find { id: i64 },
    All,
    First,
    Count,
    Sum { column: String },
    Average { column: String },
    Minimum { column: String },
    Maximum { column: String },
    Calculate {
        function: AggregateFunction,
        column: Option<String>,
    },
    Exists,
}

impl ReadOperation {
    pub fn kind(&self) -> ReadKind {
        match self {
            ReadOperation::Find { .. } => ReadKind::Find,
            ReadOperation::All => ReadKind::All,
            ReadOperation::First => ReadKind::First,
            ReadOperation::Count => ReadKind::Count,
            ReadOperation::Sum { .. } => ReadKind::Sum,
            ReadOperation::Average { .. } => ReadKind::Average,
            ReadOperation::Minimum { .. } => ReadKind::Minimum,
            ReadOperation::Maximum { .. } => ReadKind::Maximum,
            ReadOperation::Calculate { .. } => ReadKind::Calculate,
            ReadOperation::Exists => ReadKind::Exists,
        }
    }

    /// Normalized aggregate form; `None` for row-returning reads and `Exists`.
    /// A `None` column means `*`.
    pub fn aggregate(&self) -> Option<(AggregateFunction, Option<&str>)> {
        match self {
            ReadOperation::Count => Some((AggregateFunction::Count, None)),
            ReadOperation::Sum { column } => Some((AggregateFunction::Sum, Some(column))),
            ReadOperation::Average { column } => Some((AggregateFunction::Average, Some(column))),
            ReadOperation::Minimum { column } => Some((AggregateFunction::Minimum, Some(column))),
            ReadOperation::Maximum { column } => Some((AggregateFunction::Maximum, Some(column))),
            ReadOperation::Calculate { function, column } => Some((*function, column.as_deref())),
            ReadOperation::Find { .. }
            | ReadOperation::All
            | ReadOperation::First
            | ReadOperation::Exists => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in [
            ReadKind::Find,
            ReadKind::All,
            ReadKind::First,
            ReadKind::Count,
            ReadKind::Sum,
            ReadKind::Average,
            ReadKind::Minimum,
            ReadKind::Maximum,
            ReadKind::Calculate,
            ReadKind::Exists,
        ] {
            assert_eq!(kind.as_str().parse::<ReadKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let err = "pluck".parse::<ReadKind>().unwrap_err();
        assert!(matches!(err, SoftDeleteError::UnsupportedOperation { ref operation } if operation == "pluck"));
    }

    #[test]
    fn aggregates_normalize() {
        assert_eq!(
            ReadOperation::Sum { column: "balance".into() }.aggregate(),
            Some((AggregateFunction::Sum, Some("balance")))
        );
        assert_eq!(
            ReadOperation::Calculate {
                function: AggregateFunction::Count,
                column: None
            }
            .aggregate(),
            Some((AggregateFunction::Count, None))
        );
        assert_eq!(ReadOperation::Find { id: 1 }.aggregate(), None);
    }
}
