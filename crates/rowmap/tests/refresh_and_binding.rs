//! Whole-store refresh strategies, key chunking and inline key binding.

mod common;

use common::*;
use rowmap::prelude::*;
use rowmap::{Dialect, KeyBinding};
use rowmap_session::testing::MemoryConnection;

fn two_type_store() -> EntityStore<MemoryConnection> {
    let store = store();
    store.register::<Gadget>().unwrap();
    seed_widget(store.connection(), 1, "a", 1);
    store
        .connection()
        .seed("gadgets", vec![Value::Int(1), Value::Text("x".into())]);
    store
}

#[test]
fn sequential_refresh_all_loads_every_type() {
    let store = two_type_store();

    let report = store.refresh_all(&Sequential);

    assert!(report.is_success());
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(store.cached_count::<Widget>().unwrap(), 1);
    let gadget = store.get::<Gadget>(&1, GetPolicy::LocalOnly).unwrap().unwrap();
    assert_eq!(gadget.label().unwrap().as_deref(), Some("x"));
}

#[test]
fn threaded_refresh_all_isolates_failures() {
    let store = two_type_store();
    store.connection().fail_on(r#"FROM "gadgets""#);

    let report = store.refresh_all(&Threaded::new(4));

    assert!(!report.is_success());
    assert_eq!(report.succeeded().count(), 1);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].table, "gadgets");
    assert!(failed[0].result.as_ref().unwrap_err().is_storage());
    assert_eq!(store.cached_count::<Widget>().unwrap(), 1);
    assert_eq!(store.cached_count::<Gadget>().unwrap(), 0);
}

#[test]
fn long_key_lists_are_chunked() {
    let conn = connection();
    for id in 1..=5 {
        seed_widget(&conn, id, "part", 1);
    }
    let store = store_with(conn, StoreConfig::default().with_max_keys_per_statement(2));

    let found = store.refresh_keys::<Widget>(&[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(found.len(), 5);
    assert_eq!(store.connection().statements_starting_with("SELECT").len(), 3);

    assert_eq!(store.delete::<Widget>(&[1, 2, 3]).unwrap(), 3);
    assert_eq!(store.connection().statements_starting_with("DELETE").len(), 2);
    assert_eq!(store.connection().commits(), 1);
    assert_eq!(store.cached_count::<Widget>().unwrap(), 2);
}

#[test]
fn inline_binding_renders_key_literals() {
    let conn = connection();
    seed_widget(&conn, 1, "a", 1);
    seed_widget(&conn, 2, "b", 2);
    let store = store_with(
        conn,
        StoreConfig::default().with_key_binding(KeyBinding::Inline),
    );

    assert_eq!(store.refresh_keys::<Widget>(&[1, 2]).unwrap().len(), 2);
    assert_eq!(store.delete::<Widget>(&[2]).unwrap(), 1);

    let conn = store.connection();
    assert_eq!(
        conn.statements_starting_with("SELECT"),
        vec![r#"SELECT "id", "name", "price" FROM "widgets" WHERE "id" IN (1, 2)"#.to_string()]
    );
    assert_eq!(
        conn.statements_starting_with("DELETE"),
        vec![r#"DELETE FROM "widgets" WHERE "id" IN (2)"#.to_string()]
    );
}

#[test]
fn postgres_placeholders_are_numbered() {
    let conn = MemoryConnection::with_dialect(Dialect::Postgres).with_table(
        "widgets",
        vec![
            rowmap::ColumnInfo::new("id", rowmap::SqlType::BigInt).primary_key(),
            rowmap::ColumnInfo::new("name", rowmap::SqlType::Text),
            rowmap::ColumnInfo::new("price", rowmap::SqlType::Integer),
        ],
    );
    let store = store_with(conn, StoreConfig::default());

    let widget = store.new_object::<Widget>().unwrap();
    let mut draft = widget.modify();
    draft.set_price(3).unwrap();
    store.persist(vec![draft.finish()]).unwrap();

    assert_eq!(stored_price(store.connection(), 1), Some(Value::Int(3)));
    assert_eq!(
        store.connection().statements_starting_with("UPDATE"),
        vec![r#"UPDATE "widgets" SET "name" = $1, "price" = $2 WHERE "id" = $3"#.to_string()]
    );
}

#[test]
fn store_config_loads_from_json() {
    let config = StoreConfig::from_json(
        r#"{"write_isolation": "serializable", "max_keys_per_statement": 50}"#,
    )
    .unwrap();
    let store = store_with(connection(), config);
    store.new_object::<Widget>().unwrap();

    assert_eq!(
        store.connection().statements()[0],
        "BEGIN ISOLATION LEVEL SERIALIZABLE"
    );
}
