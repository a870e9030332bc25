//! Query descriptors for list retrieval.
//!
//! A [`Query`] combines per-field filter predicates, an optional sort and an
//! optional page window. Descriptors pass through the behavior pipeline
//! untouched until the URL layer encodes them as a query string; the
//! real-time layer evaluates them locally through [`QueryLogic`].

mod logic;
mod params;

use std::collections::BTreeMap;

pub use logic::{QueryLogic, compare_values};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::json_kind;

/// A query descriptor could not be read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueryError {
    /// The descriptor was not a JSON object.
    #[error("query must be an object, found {0}")]
    NotAnObject(&'static str),
    /// A filter operator is not recognised.
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
    /// `$in` or `$nin` was given something other than a list.
    #[error("operator `{0}` expects a list")]
    ExpectedList(&'static str),
    /// The sort clause was not a field name.
    #[error("sort must be a field name, optionally prefixed with `-`")]
    InvalidSort,
    /// The page clause was malformed.
    #[error("page must hold non-negative `start` and `end` with start <= end")]
    InvalidPage,
}

/// Comparison applied by one filter operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Field equals the operand.
    Eq,
    /// Field differs from the operand.
    Ne,
    /// Field is greater than the operand.
    Gt,
    /// Field is greater than or equal to the operand.
    Gte,
    /// Field is less than the operand.
    Lt,
    /// Field is less than or equal to the operand.
    Lte,
    /// Field equals one of the operands.
    In,
    /// Field equals none of the operands.
    Nin,
}

impl Comparison {
    /// Operator spelling used in JSON and query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
        }
    }

    fn parse(op: &str) -> Result<Self, QueryError> {
        Ok(match op {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$in" => Self::In,
            "$nin" => Self::Nin,
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        })
    }

    const fn takes_list(self) -> bool { matches!(self, Self::In | Self::Nin) }
}

/// Conjunction of comparisons against a single field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<(Comparison, Value)>,
}

impl Predicate {
    /// Predicate holding a single comparison.
    #[must_use]
    pub fn new(op: Comparison, operand: impl Into<Value>) -> Self {
        Self {
            clauses: vec![(op, operand.into())],
        }
    }

    /// Field equals `operand`.
    #[must_use]
    pub fn eq(operand: impl Into<Value>) -> Self { Self::new(Comparison::Eq, operand) }

    /// Field is greater than `operand`.
    #[must_use]
    pub fn gt(operand: impl Into<Value>) -> Self { Self::new(Comparison::Gt, operand) }

    /// Field is less than `operand`.
    #[must_use]
    pub fn lt(operand: impl Into<Value>) -> Self { Self::new(Comparison::Lt, operand) }

    /// Field equals one of `operands`.
    #[must_use]
    pub fn one_of<I, V>(operands: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(
            Comparison::In,
            Value::Array(operands.into_iter().map(Into::into).collect()),
        )
    }

    /// Add another comparison that must also hold.
    #[must_use]
    pub fn and(mut self, op: Comparison, operand: impl Into<Value>) -> Self {
        self.clauses.push((op, operand.into()));
        self
    }

    /// The comparisons making up this predicate.
    #[must_use]
    pub fn clauses(&self) -> &[(Comparison, Value)] { &self.clauses }

    fn from_value(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                let mut clauses = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    let op = Comparison::parse(op)?;
                    if op.takes_list() && !operand.is_array() {
                        return Err(QueryError::ExpectedList(op.as_str()));
                    }
                    clauses.push((op, operand.clone()));
                }
                Ok(Self { clauses })
            }
            Value::Array(_) => Ok(Self::new(Comparison::In, value.clone())),
            other => Ok(Self::eq(other.clone())),
        }
    }

    fn to_value(&self) -> Value {
        match self.clauses.as_slice() {
            [(Comparison::Eq, operand)] if !operand.is_object() && !operand.is_array() => {
                operand.clone()
            }
            clauses => Value::Object(
                clauses
                    .iter()
                    .map(|(op, operand)| (op.as_str().to_string(), operand.clone()))
                    .collect(),
            ),
        }
    }
}

/// Sort order for list results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    field: String,
    descending: bool,
}

impl Sort {
    /// Ascending by `field`.
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending by `field`.
    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parse `field` or `-field`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidSort`] for an empty field name.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let text = text.trim();
        let (field, descending) = match text.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (text, false),
        };
        let field = field.split_whitespace().next().unwrap_or_default();
        if field.is_empty() {
            return Err(QueryError::InvalidSort);
        }
        // "field desc" is accepted alongside "-field".
        let descending = descending || text.ends_with(" desc");
        Ok(Self {
            field: field.to_string(),
            descending,
        })
    }

    /// Field sorted on.
    #[must_use]
    pub fn field(&self) -> &str { &self.field }

    /// Whether larger values come first.
    #[must_use]
    pub fn is_descending(&self) -> bool { self.descending }

    fn to_text(&self) -> String {
        if self.descending {
            format!("-{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

/// Inclusive index window over the sorted result set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    start: usize,
    end: usize,
}

impl Page {
    /// Window covering indices `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidPage`] if `start > end`.
    pub fn new(start: usize, end: usize) -> Result<Self, QueryError> {
        if start > end {
            return Err(QueryError::InvalidPage);
        }
        Ok(Self { start, end })
    }

    /// First index in the window.
    #[must_use]
    pub fn start(&self) -> usize { self.start }

    /// Last index in the window.
    #[must_use]
    pub fn end(&self) -> usize { self.end }

    /// Number of slots in the window.
    #[must_use]
    pub fn len(&self) -> usize { (self.end - self.start).saturating_add(1) }

    /// Windows are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { false }
}

/// Filter, sort and page window for a list request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    filter: BTreeMap<String, Predicate>,
    sort: Option<Sort>,
    page: Option<Page>,
}

impl Query {
    /// A query matching every record.
    #[must_use]
    pub fn all() -> Self { Self::default() }

    /// Add a predicate on `field`, replacing any existing one.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.filter.insert(field.into(), predicate);
        self
    }

    /// Set the sort order.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Set the page window.
    #[must_use]
    pub fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    /// Per-field predicates.
    #[must_use]
    pub fn predicates(&self) -> &BTreeMap<String, Predicate> { &self.filter }

    /// Sort order, if any.
    #[must_use]
    pub fn sort_order(&self) -> Option<&Sort> { self.sort.as_ref() }

    /// Page window, if any.
    #[must_use]
    pub fn page_window(&self) -> Option<Page> { self.page }

    /// Read a descriptor in its JSON form.
    ///
    /// ```
    /// use restmodel::query::Query;
    /// use serde_json::json;
    ///
    /// let query = Query::from_value(&json!({
    ///     "sort": "-points",
    ///     "filter": {"dueDate": {"$gt": "2001-04-30"}},
    /// }))
    /// .expect("valid query");
    /// assert_eq!(query.sort_order().map(|s| s.field()), Some("points"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the descriptor is malformed.
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = value else {
            return Err(QueryError::NotAnObject(json_kind(value)));
        };
        let mut query = Self::default();
        if let Some(filter) = map.get("filter") {
            let Value::Object(fields) = filter else {
                return Err(QueryError::NotAnObject(json_kind(filter)));
            };
            for (field, predicate) in fields {
                query
                    .filter
                    .insert(field.clone(), Predicate::from_value(predicate)?);
            }
        }
        match map.get("sort") {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => query.sort = Some(Sort::parse(text)?),
            Some(_) => return Err(QueryError::InvalidSort),
        }
        match map.get("page") {
            None | Some(Value::Null) => {}
            Some(Value::Object(page)) => {
                let bound = |key: &str| {
                    page.get(key)
                        .and_then(|v| {
                            v.as_u64()
                                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                        })
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or(QueryError::InvalidPage)
                };
                query.page = Some(Page::new(bound("start")?, bound("end")?)?);
            }
            Some(_) => return Err(QueryError::InvalidPage),
        }
        Ok(query)
    }

    /// Render the descriptor in its JSON form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if !self.filter.is_empty() {
            map.insert(
                "filter".into(),
                Value::Object(
                    self.filter
                        .iter()
                        .map(|(field, predicate)| (field.clone(), predicate.to_value()))
                        .collect(),
                ),
            );
        }
        if let Some(sort) = &self.sort {
            map.insert("sort".into(), Value::String(sort.to_text()));
        }
        if let Some(page) = self.page {
            let mut window = Map::new();
            window.insert("start".into(), page.start.into());
            window.insert("end".into(), page.end.into());
            map.insert("page".into(), Value::Object(window));
        }
        Value::Object(map)
    }

    /// Encode as bracketed query-string pairs, e.g. `filter[points][$gt]=5`.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> { params::encode(&self.to_value()) }

    /// Decode bracketed query-string pairs produced by [`Query::to_params`].
    ///
    /// Operand values arrive as strings; normalize the result through
    /// [`QueryLogic::normalize`] to restore field types.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the decoded descriptor is malformed.
    pub fn from_params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self, QueryError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::from_value(&params::decode(pairs))
    }

    pub(crate) fn replace_predicates(&mut self, filter: BTreeMap<String, Predicate>) {
        self.filter = filter;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[test]
    fn json_form_reads_operators_lists_and_literals() {
        let query = Query::from_value(&json!({
            "filter": {
                "status": ["new", "assigned"],
                "points": {"$gte": 5, "$lt": 10},
                "name": "lawn"
            },
            "sort": "-points",
            "page": {"start": 0, "end": 9}
        }))
        .expect("valid query");

        assert_eq!(
            query.predicates().get("status"),
            Some(&Predicate::one_of(["new", "assigned"]))
        );
        assert_eq!(
            query.predicates().get("points"),
            Some(&Predicate::new(Comparison::Gte, 5).and(Comparison::Lt, 10))
        );
        assert_eq!(query.predicates().get("name"), Some(&Predicate::eq("lawn")));
        assert_eq!(query.sort_order(), Some(&Sort::desc("points")));
        assert_eq!(query.page_window(), Page::new(0, 9).ok());
    }

    #[rstest]
    #[case(json!([]), QueryError::NotAnObject("an array"))]
    #[case(json!({"filter": {"a": {"$near": 1}}}), QueryError::UnknownOperator("$near".into()))]
    #[case(json!({"filter": {"a": {"$in": 1}}}), QueryError::ExpectedList("$in"))]
    #[case(json!({"sort": 3}), QueryError::InvalidSort)]
    #[case(json!({"sort": "-"}), QueryError::InvalidSort)]
    #[case(json!({"page": {"start": 4, "end": 1}}), QueryError::InvalidPage)]
    fn malformed_descriptors_are_rejected(#[case] raw: Value, #[case] expected: QueryError) {
        assert_eq!(Query::from_value(&raw), Err(expected));
    }

    #[test]
    fn sort_accepts_suffix_form() {
        assert_eq!(Sort::parse("points desc"), Ok(Sort::desc("points")));
        assert_eq!(Sort::parse("points"), Ok(Sort::asc("points")));
    }

    #[test]
    fn params_survive_the_query_string_form() {
        let query = Query::all()
            .filter(
                "dueDate",
                Predicate::gt("2001-04-30T00:00:00Z"),
            )
            .filter("status", Predicate::one_of(["new", "complete"]))
            .sort(Sort::desc("points"))
            .page(Page::new(2, 5).expect("page"));

        let params = query.to_params();
        assert!(params.contains(&("sort".into(), "-points".into())));
        assert!(params.contains(&("filter[dueDate][$gt]".into(), "2001-04-30T00:00:00Z".into())));
        assert!(params.contains(&("filter[status][$in][]".into(), "new".into())));

        let decoded = Query::from_params(params).expect("decodes");
        assert_eq!(decoded, query);
    }

    #[rstest]
    #[case(0, 0, 1)]
    #[case(2, 5, 4)]
    #[case(0, usize::MAX, usize::MAX)]
    #[case(usize::MAX, usize::MAX, 1)]
    fn window_length_counts_inclusive_slots(
        #[case] start: usize,
        #[case] end: usize,
        #[case] len: usize,
    ) {
        assert_eq!(Page::new(start, end).expect("page").len(), len);
    }

    #[test]
    fn empty_query_has_no_params() {
        assert!(Query::all().to_params().is_empty());
    }
}
