//! Read-side query descriptions: key ranges, `get_all` options and
//! field conditions for `query`.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stowage_model::path;

/// A predicate over a JSON value.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Bounds on a primary key or an indexed field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyRange {
    pub lower: Option<Value>,
    pub upper: Option<Value>,
    pub lower_open: bool,
    pub upper_open: bool,
}

impl KeyRange {
    /// Matches exactly one value.
    pub fn only(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            lower: Some(value.clone()),
            upper: Some(value),
            ..Self::default()
        }
    }

    /// Everything at or above (`open`: strictly above) `value`.
    pub fn lower_bound(value: impl Into<Value>, open: bool) -> Self {
        Self {
            lower: Some(value.into()),
            lower_open: open,
            ..Self::default()
        }
    }

    /// Everything at or below (`open`: strictly below) `value`.
    pub fn upper_bound(value: impl Into<Value>, open: bool) -> Self {
        Self {
            upper: Some(value.into()),
            upper_open: open,
            ..Self::default()
        }
    }

    /// Both ends bounded.
    pub fn bound(
        lower: impl Into<Value>,
        upper: impl Into<Value>,
        lower_open: bool,
        upper_open: bool,
    ) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: Some(upper.into()),
            lower_open,
            upper_open,
        }
    }
}

/// Sort direction for [`SortSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// In-memory sort by one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: Direction,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// Options for `get_all`.
///
/// The store reads by primary key or by the named index (restricted by
/// `value` or `range`), then applies `filter`, `sort`, `offset` and `limit`
/// in memory, in that order.
#[derive(Clone, Default)]
pub struct QueryOptions {
    pub index: Option<String>,
    pub value: Option<Value>,
    pub range: Option<KeyRange>,
    pub filter: Option<Predicate>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    #[must_use]
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn range(mut self, range: KeyRange) -> Self {
        self.range = Some(range);
        self
    }

    #[must_use]
    pub fn filter(mut self, f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Applies filter, sort and pagination to records already read.
    pub(crate) fn refine(&self, mut records: Vec<Value>) -> Vec<Value> {
        if let Some(filter) = &self.filter {
            records.retain(|r| filter(r));
        }
        if let Some(sort) = &self.sort {
            records.sort_by(|a, b| {
                let a = path::lookup(a, &sort.field).unwrap_or(&Value::Null);
                let b = path::lookup(b, &sort.field).unwrap_or(&Value::Null);
                let ord = path::compare(a, b);
                match sort.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        records.into_iter().skip(offset).take(limit).collect()
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("index", &self.index)
            .field("value", &self.value)
            .field("range", &self.range)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

/// One field condition for `query`.
#[derive(Clone)]
pub enum Condition {
    /// The field equals this value (a missing field equals `null`).
    Equals(Value),
    /// The predicate accepts the field value (`null` when missing).
    Matches(Predicate),
}

impl Condition {
    pub fn matches(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Condition::Matches(Arc::new(f))
    }

    fn check(&self, field: &Value) -> bool {
        match self {
            Condition::Equals(expected) => field == expected,
            Condition::Matches(predicate) => predicate(field),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Condition::Matches(_) => f.write_str("Matches(<fn>)"),
        }
    }
}

impl From<Value> for Condition {
    fn from(value: Value) -> Self {
        Condition::Equals(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Condition::Equals(Value::from(value))
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Condition::Equals(Value::from(value))
    }
}

impl From<i64> for Condition {
    fn from(value: i64) -> Self {
        Condition::Equals(Value::from(value))
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Condition::Equals(Value::from(value))
    }
}

/// Field conditions for `query`; all must hold.
pub type Conditions = BTreeMap<String, Condition>;

/// Builds a filter accepting records that satisfy every condition.
pub(crate) fn conditions_filter(conditions: Conditions) -> Predicate {
    Arc::new(move |record: &Value| {
        conditions.iter().all(|(field, condition)| {
            condition.check(path::lookup(record, field).unwrap_or(&Value::Null))
        })
    })
}
