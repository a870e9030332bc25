//! Local evaluation of query descriptors against records.

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use serde_json::Value;

use super::{Comparison, Predicate, Query, Sort};
use crate::{
    error::SchemaError,
    record::{IdentityKey, Record},
    schema::Schema,
};

static NULL: Value = Value::Null;

/// Identity extraction, membership and ordering rules for one model.
#[derive(Clone, Debug)]
pub struct QueryLogic {
    schema: Arc<Schema>,
    identity: Vec<String>,
}

impl QueryLogic {
    /// Logic using the schema's declared identity fields.
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        let identity = schema.identity_fields();
        Self { schema, identity }
    }

    /// Logic using an explicit list of identity fields.
    #[must_use]
    pub fn with_identity<I, S>(schema: Arc<Schema>, identity: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema,
            identity: identity.into_iter().map(Into::into).collect(),
        }
    }

    /// Schema the logic evaluates against.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> { &self.schema }

    /// Identity field names.
    #[must_use]
    pub fn identity_fields(&self) -> &[String] { &self.identity }

    /// Identity of `record`, or `None` when any identity value is absent.
    #[must_use]
    pub fn identity(&self, record: &Record) -> Option<IdentityKey> {
        IdentityKey::from_values(self.identity.iter().map(|field| record.get(field)))
    }

    /// Coerce every operand in `query` to its field's declared type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when an operand cannot be coerced.
    pub fn normalize(&self, query: &Query) -> Result<Query, SchemaError> {
        let mut filter = BTreeMap::new();
        for (field, predicate) in query.predicates() {
            let mut clauses = Vec::with_capacity(predicate.clauses().len());
            for (op, operand) in predicate.clauses() {
                let operand = match operand {
                    Value::Array(items) if op.takes_list() => Value::Array(
                        items
                            .iter()
                            .map(|item| self.schema.coerce_value(field, item.clone()))
                            .collect::<Result<_, _>>()?,
                    ),
                    single => self.schema.coerce_value(field, single.clone())?,
                };
                clauses.push((*op, operand));
            }
            filter.insert(field.clone(), Predicate { clauses });
        }
        let mut normalized = query.clone();
        normalized.replace_predicates(filter);
        Ok(normalized)
    }

    /// Whether `record` satisfies every predicate of `query`.
    ///
    /// Page windows are not considered; membership is about the filter.
    #[must_use]
    pub fn is_member(&self, query: &Query, record: &Record) -> bool {
        query.predicates().iter().all(|(field, predicate)| {
            let value = record.get(field).unwrap_or(&NULL);
            predicate
                .clauses()
                .iter()
                .all(|(op, operand)| self.satisfies(field, value, *op, operand))
        })
    }

    fn satisfies(&self, field: &str, value: &Value, op: Comparison, operand: &Value) -> bool {
        let operand = self.operand(field, operand);
        match op {
            Comparison::Eq => compare_values(value, &operand) == Ordering::Equal,
            Comparison::Ne => compare_values(value, &operand) != Ordering::Equal,
            Comparison::In | Comparison::Nin => {
                let found = operand
                    .as_array()
                    .is_some_and(|items| {
                        items
                            .iter()
                            .any(|item| compare_values(value, item) == Ordering::Equal)
                    });
                found == (op == Comparison::In)
            }
            Comparison::Gt | Comparison::Gte | Comparison::Lt | Comparison::Lte => {
                if value.is_null() || operand.is_null() {
                    return false;
                }
                let ordering = compare_values(value, &operand);
                match op {
                    Comparison::Gt => ordering == Ordering::Greater,
                    Comparison::Gte => ordering != Ordering::Less,
                    Comparison::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }

    fn operand(&self, field: &str, operand: &Value) -> Value {
        match operand {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.coerce_or_keep(field, item))
                    .collect(),
            ),
            single => self.coerce_or_keep(field, single),
        }
    }

    fn coerce_or_keep(&self, field: &str, value: &Value) -> Value {
        self.schema
            .coerce_value(field, value.clone())
            .unwrap_or_else(|_| value.clone())
    }

    /// Order two records under `sort`, breaking ties by identity.
    ///
    /// Without a sort, records are ordered by identity ascending.
    #[must_use]
    pub fn compare(&self, sort: Option<&Sort>, a: &Record, b: &Record) -> Ordering {
        if let Some(sort) = sort {
            let left = a.get(sort.field()).unwrap_or(&NULL);
            let right = b.get(sort.field()).unwrap_or(&NULL);
            let ordering = compare_values(left, right);
            let ordering = if sort.is_descending() {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.compare_identity(a, b)
    }

    fn compare_identity(&self, a: &Record, b: &Record) -> Ordering {
        self.identity
            .iter()
            .map(|field| {
                compare_values(
                    a.get(field).unwrap_or(&NULL),
                    b.get(field).unwrap_or(&NULL),
                )
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    /// Index at which `record` belongs in `sorted` under `query`'s order.
    ///
    /// `sorted` must already be ordered by [`QueryLogic::compare`] and must
    /// not contain `record` itself. Records comparing equal are passed over,
    /// so the new record lands after them.
    #[must_use]
    pub fn index<'a, I>(&self, query: &Query, sorted: I, record: &Record) -> usize
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let sorted: Vec<&Record> = sorted.into_iter().collect();
        sorted.partition_point(|item| {
            self.compare(query.sort_order(), item, record) != Ordering::Greater
        })
    }

    /// Filter, sort and window `records`; also returns the filtered count.
    #[must_use]
    pub fn apply<'a, I>(&self, query: &Query, records: I) -> (Vec<Record>, usize)
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut matched: Vec<Record> = records
            .into_iter()
            .filter(|record| self.is_member(query, record))
            .cloned()
            .collect();
        matched.sort_by(|a, b| self.compare(query.sort_order(), a, b));
        let count = matched.len();
        if let Some(page) = query.page_window() {
            let start = page.start().min(count);
            let end = page.end().saturating_add(1).min(count);
            matched = matched.drain(start..end).collect();
        }
        (matched, count)
    }
}

/// Total order over JSON scalars used for filters and sorting.
///
/// `null` sorts first, then booleans, numbers and strings; other kinds sort
/// last and compare by their text.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (x, y) if rank(x) != rank(y) => rank(x).cmp(&rank(y)),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::schema::Field;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn todo_logic() -> QueryLogic {
        QueryLogic::new(
            Schema::builder("Todo")
                .field(Field::number("_id").identity())
                .field(Field::date("dueDate"))
                .field(Field::number("points"))
                .field(Field::string("status"))
                .build(),
        )
    }

    #[fixture]
    fn logic() -> QueryLogic { todo_logic() }

    #[rstest]
    fn date_operands_compare_chronologically(logic: QueryLogic) {
        let query = Query::all().filter("dueDate", Predicate::gt("2001-04-30"));
        let later = record(json!({"_id": 1, "dueDate": "2017-04-30T00:00:00Z"}));
        let earlier = record(json!({"_id": 2, "dueDate": "2000-04-30T00:00:00Z"}));
        let missing = record(json!({"_id": 3}));
        assert!(logic.is_member(&query, &later));
        assert!(!logic.is_member(&query, &earlier));
        assert!(!logic.is_member(&query, &missing));
    }

    #[rstest]
    fn string_operands_coerce_to_numbers(logic: QueryLogic) {
        let query = Query::all().filter("points", Predicate::new(Comparison::Gte, "10"));
        assert!(logic.is_member(&query, &record(json!({"_id": 1, "points": 10}))));
        assert!(!logic.is_member(&query, &record(json!({"_id": 1, "points": 9}))));
    }

    #[rstest]
    fn set_operators(logic: QueryLogic) {
        let within = Query::all().filter("status", Predicate::one_of(["new", "assigned"]));
        let outside = Query::all().filter(
            "status",
            Predicate::new(Comparison::Nin, json!(["new", "assigned"])),
        );
        let todo = record(json!({"_id": 1, "status": "new"}));
        assert!(logic.is_member(&within, &todo));
        assert!(!logic.is_member(&outside, &todo));
    }

    #[rstest]
    fn ne_matches_absent_fields(logic: QueryLogic) {
        let query = Query::all().filter("status", Predicate::new(Comparison::Ne, "new"));
        assert!(logic.is_member(&query, &record(json!({"_id": 1}))));
    }

    #[rstest]
    fn default_order_is_identity(logic: QueryLogic) {
        let a = record(json!({"_id": 2}));
        let b = record(json!({"_id": 10}));
        assert_eq!(logic.compare(None, &a, &b), Ordering::Less);
    }

    #[rstest]
    fn descending_sort_places_larger_first(logic: QueryLogic) {
        let query = Query::all().sort(Sort::desc("points"));
        let sorted = [
            record(json!({"_id": 1, "points": 20})),
            record(json!({"_id": 2, "points": 10})),
        ];
        let fresh = record(json!({"_id": 3, "points": 15}));
        assert_eq!(logic.index(&query, &sorted, &fresh), 1);
        let tie = record(json!({"_id": 4, "points": 10}));
        assert_eq!(logic.index(&query, &sorted, &tie), 2);
    }

    #[rstest]
    fn apply_filters_sorts_and_windows(logic: QueryLogic) {
        let records: Vec<Record> = (1..=5)
            .map(|id| record(json!({"_id": id, "points": id * 10})))
            .collect();
        let query = Query::all()
            .filter("points", Predicate::new(Comparison::Gte, 20))
            .sort(Sort::desc("points"))
            .page(crate::query::Page::new(1, 2).expect("page"));
        let (page, count) = logic.apply(&query, &records);
        assert_eq!(count, 4);
        let ids: Vec<&Value> = page.iter().filter_map(|r| r.get("_id")).collect();
        assert_eq!(ids, vec![&json!(4), &json!(3)]);
    }

    #[rstest]
    #[case(0, usize::MAX, vec![1, 2, 3])]
    #[case(1, usize::MAX, vec![2, 3])]
    #[case(usize::MAX, usize::MAX, vec![])]
    fn apply_accepts_open_ended_windows(
        logic: QueryLogic,
        #[case] start: usize,
        #[case] end: usize,
        #[case] expected: Vec<i64>,
    ) {
        let records: Vec<Record> = (1..=3)
            .map(|id| record(json!({"_id": id, "points": id})))
            .collect();
        let query = Query::all()
            .sort(Sort::asc("points"))
            .page(crate::query::Page::new(start, end).expect("page"));
        let (page, count) = logic.apply(&query, &records);
        assert_eq!(count, 3);
        let ids: Vec<i64> = page
            .iter()
            .filter_map(|r| r.get("_id").and_then(Value::as_i64))
            .collect();
        assert_eq!(ids, expected);
    }

    #[rstest]
    fn normalize_coerces_operands(logic: QueryLogic) {
        let query = Query::all()
            .filter("points", Predicate::one_of(["1", "2"]))
            .filter("dueDate", Predicate::gt("2001-04-30"));
        let normalized = logic.normalize(&query).expect("normalizes");
        assert_eq!(
            normalized.predicates().get("points"),
            Some(&Predicate::one_of([1, 2]))
        );
        assert_eq!(
            normalized.predicates().get("dueDate"),
            Some(&Predicate::gt("2001-04-30T00:00:00Z"))
        );
    }

    proptest! {
        #[test]
        fn inserting_at_index_keeps_order(
            points in proptest::collection::vec(0i64..50, 0..20),
            fresh in 0i64..50,
            descending in any::<bool>(),
        ) {
            let logic = todo_logic();
            let sort = if descending { Sort::desc("points") } else { Sort::asc("points") };
            let query = Query::all().sort(sort);
            let mut items: Vec<Record> = points
                .iter()
                .enumerate()
                .map(|(id, p)| record(json!({"_id": id, "points": p})))
                .collect();
            items.sort_by(|a, b| logic.compare(query.sort_order(), a, b));

            let new_record = record(json!({"_id": 1000, "points": fresh}));
            let at = logic.index(&query, &items, &new_record);
            items.insert(at, new_record);

            let ordered = items.windows(2).all(|pair| {
                logic.compare(query.sort_order(), &pair[0], &pair[1]) != Ordering::Greater
            });
            prop_assert!(ordered);
        }
    }
}
