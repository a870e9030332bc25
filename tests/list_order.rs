//! Reconciliation keeps sorted lists sorted whatever the arrival order.

use proptest::prelude::*;
use restmodel::{
    Record,
    query::{Query, Sort},
};
use restmodel_testing::{TodoHarness, record};
use serde_json::{Value, json};

fn points(values: &[Record]) -> Vec<i64> {
    values
        .iter()
        .map(|item| item.get("points").and_then(Value::as_i64).unwrap_or_default())
        .collect()
}

proptest! {
    #[test]
    fn pushed_records_land_in_sort_order(
        seeded in proptest::collection::vec(-50i64..50, 0..8),
        pushed in proptest::collection::vec(-50i64..50, 1..8),
        descending in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let held = runtime.block_on(async {
            let todos = TodoHarness::new();
            todos.seed(seeded.iter().map(|p| json!({"points": p})));
            let sort = if descending { Sort::desc("points") } else { Sort::asc("points") };
            let list = todos.model.get_list(&Query::all().sort(sort)).await.expect("listed");
            for p in &pushed {
                let created = todos.store.create_instance(record(json!({"points": p})));
                todos.model.create_instance(created).await.expect("push applied");
            }
            points(&list.serialize())
        });

        let mut expected: Vec<i64> = seeded.iter().chain(&pushed).copied().collect();
        expected.sort_unstable();
        if descending {
            expected.reverse();
        }
        prop_assert_eq!(held, expected);
    }
}
