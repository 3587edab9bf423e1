mod common;

use common::open_store;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use stowage_model::WriteOptions;

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

#[tokio::test]
async fn floats_read_back_bit_exact() {
    let store = open_store();
    let samples = [
        1.0715660391465826e-75,
        0.1 + 0.2,
        -2.2250738585072014e-308,
        f64::MAX,
        f64::MIN_POSITIVE,
        123456.789e300,
    ];
    for (i, x) in samples.into_iter().enumerate() {
        let id = format!("f{i}");
        let value = json!({"id": id, "slug": id, "x": x});
        store.storage.put("tasks", value.clone(), WriteOptions::default()).await.unwrap();
        let back = store.storage.get("tasks", id.as_str()).await.unwrap().unwrap();
        assert_eq!(back["x"].as_f64().map(f64::to_bits), Some(x.to_bits()));
        assert_eq!(back, value);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stored_values_read_back_unchanged(body in arb_json()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (written, read) = rt.block_on(async {
            let store = open_store();
            let value = json!({"id": "r1", "slug": "r1", "body": body});
            store.storage.put("tasks", value.clone(), WriteOptions::default()).await.unwrap();
            let back = store.storage.get("tasks", "r1").await.unwrap();
            (value, back)
        });
        prop_assert_eq!(read, Some(written));
    }
}
