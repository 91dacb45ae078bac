//! Identity, read policies, refresh and registration through the facade.

mod common;

use common::*;
use rowmap::prelude::*;
use rowmap::{ConfigErrorKind, RegisterOptions};

#[derive(Record, Debug, Clone, Default)]
#[rowmap(table = "widgets", id = String)]
struct Sku {
    name: String,
    price: i32,
}

#[test]
fn same_id_yields_same_entity() {
    let store = store();
    seed_widget(store.connection(), 1, "bolt", 3);

    let a = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();
    let b = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();
    assert!(Entity::ptr_eq(&a, &b));

    let all = store.get_all::<Widget>(GetPolicy::FetchIfMissing).unwrap();
    assert_eq!(all.len(), 1);
    assert!(Entity::ptr_eq(&all[0], &a));
    assert_eq!(a.name().unwrap(), "bolt");
    assert_eq!(a.price().unwrap(), 3);
}

#[test]
fn refresh_updates_entities_in_place() {
    let store = store();
    seed_widget(store.connection(), 1, "bolt", 3);
    let widget = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();

    store
        .connection()
        .set_value("widgets", &Value::BigInt(1), "price", Value::Int(9));
    assert_eq!(widget.price().unwrap(), 3);

    let refreshed = store.refresh::<Widget>().unwrap();
    assert_eq!(refreshed.len(), 1);
    assert!(Entity::ptr_eq(&refreshed[0], &widget));
    assert_eq!(widget.price().unwrap(), 9);
    assert_eq!(
        widget.to_record().unwrap(),
        Widget {
            name: "bolt".into(),
            price: 9
        }
    );
}

#[test]
fn get_policies_control_database_access() {
    let store = store();
    let conn = store.connection();
    seed_widget(conn, 1, "bolt", 3);

    assert!(store.get::<Widget>(&1, GetPolicy::LocalOnly).unwrap().is_none());
    assert!(conn.statements().is_empty());

    let widget = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();
    assert_eq!(conn.statements_starting_with("SELECT").len(), 1);

    store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap();
    assert_eq!(conn.statements_starting_with("SELECT").len(), 1);

    conn.set_value("widgets", &Value::BigInt(1), "price", Value::Int(7));
    let forced = store.get::<Widget>(&1, GetPolicy::ForceRefreshFirst).unwrap().unwrap();
    assert!(Entity::ptr_eq(&forced, &widget));
    assert_eq!(widget.price().unwrap(), 7);
    assert_eq!(conn.statements_starting_with("SELECT").len(), 2);

    assert!(store.get::<Widget>(&99, GetPolicy::FetchIfMissing).unwrap().is_none());
}

#[test]
fn local_only_get_all_reads_the_cache() {
    let store = store();
    seed_widget(store.connection(), 1, "bolt", 3);

    assert!(store.get_all::<Widget>(GetPolicy::LocalOnly).unwrap().is_empty());
    assert_eq!(store.get_all::<Widget>(GetPolicy::FetchIfMissing).unwrap().len(), 1);
    assert_eq!(store.get_all::<Widget>(GetPolicy::LocalOnly).unwrap().len(), 1);
}

#[test]
fn refresh_evicts_vanished_rows() {
    let store = store();
    let conn = store.connection();
    for id in 1..=3 {
        seed_widget(conn, id, "part", 1);
    }
    assert_eq!(store.get_all::<Widget>(GetPolicy::FetchIfMissing).unwrap().len(), 3);
    let third = store.get::<Widget>(&3, GetPolicy::LocalOnly).unwrap().unwrap();

    conn.remove_row("widgets", &Value::BigInt(3));
    let remaining = store.refresh::<Widget>().unwrap();

    assert_eq!(remaining.len(), 2);
    assert_eq!(store.cached_count::<Widget>().unwrap(), 2);
    assert!(third.is_removed());
    assert!(store.get::<Widget>(&3, GetPolicy::LocalOnly).unwrap().is_none());
}

#[test]
fn failed_refresh_evicts_nothing() {
    let store = store();
    let conn = store.connection();
    seed_widget(conn, 1, "a", 1);
    seed_widget(conn, 2, "b", 2);
    let cached = store.get_all::<Widget>(GetPolicy::FetchIfMissing).unwrap();
    assert_eq!(cached.len(), 2);

    conn.remove_row("widgets", &Value::BigInt(2));
    conn.fail_on("SELECT");

    assert!(store.refresh::<Widget>().unwrap_err().is_storage());
    assert!(store.refresh_keys::<Widget>(&[1, 2]).unwrap_err().is_storage());
    assert_eq!(store.cached_count::<Widget>().unwrap(), 2);
    assert!(cached.iter().all(|w| !w.is_removed()));
}

#[test]
fn refresh_entity_reports_missing_rows() {
    let store = store();
    seed_widget(store.connection(), 1, "bolt", 3);
    let widget = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();

    assert!(store.refresh_entity(&widget).unwrap());
    store.connection().remove_row("widgets", &Value::BigInt(1));
    assert!(!store.refresh_entity(&widget).unwrap());
    assert!(widget.is_removed());
}

#[test]
fn refresh_keys_deduplicates() {
    let store = store();
    seed_widget(store.connection(), 1, "a", 1);
    seed_widget(store.connection(), 2, "b", 2);

    let found = store.refresh_keys::<Widget>(&[1, 1, 2, 7]).unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(
        store.connection().statements_starting_with("SELECT"),
        vec![r#"SELECT "id", "name", "price" FROM "widgets" WHERE "id" IN (?, ?, ?)"#.to_string()]
    );
}

#[test]
fn registration_errors() {
    let store = EntityStore::new(connection());

    let err = store.get::<Widget>(&1, GetPolicy::LocalOnly).unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::Unregistered));

    store.register::<Widget>().unwrap();
    assert!(store.is_registered::<Widget>());
    let err = store.register::<Widget>().unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::DuplicateRegistration));

    let err = store
        .register_with::<Gadget>(TableMapping::of::<Gadget>().with_table("missing"))
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnresolvedIdType));
    assert!(!store.is_registered::<Gadget>());

    let err = store
        .register_with::<Gadget>(TableMapping::of::<Widget>())
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::InvalidArgument));

    let err = store
        .register_with_options::<Gadget>(
            RegisterOptions::new().initializer(FieldDefaults::new().with("colour", "red")),
        )
        .unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownField));
}

#[test]
fn text_ids_cannot_map_onto_integer_id_columns() {
    let store = EntityStore::new(connection());
    let err = store.register::<Sku>().unwrap_err();
    assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnresolvedIdType));
}

#[test]
fn custom_mapping_renames_table_and_columns() {
    let conn = connection().with_table(
        "legacy_widgets",
        vec![
            rowmap::ColumnInfo::new("widget_id", rowmap::SqlType::BigInt).primary_key(),
            rowmap::ColumnInfo::new("label", rowmap::SqlType::Text),
            rowmap::ColumnInfo::new("unit_price", rowmap::SqlType::Integer),
        ],
    );
    conn.seed(
        "legacy_widgets",
        vec![Value::BigInt(4), Value::Text("hinge".into()), Value::Int(6)],
    );
    let store = EntityStore::new(conn);
    let mapping = TableMapping::of::<Widget>()
        .with_table("legacy_widgets")
        .with_id_column("widget_id")
        .with_column("name", "label")
        .unwrap()
        .with_column("price", "unit_price")
        .unwrap();
    store.register_with::<Widget>(mapping).unwrap();

    let widget = store.get::<Widget>(&4, GetPolicy::FetchIfMissing).unwrap().unwrap();
    assert_eq!(widget.name().unwrap(), "hinge");
    assert_eq!(store.registered_tables(), vec!["legacy_widgets".to_string()]);
    assert_eq!(
        store.connection().statements_starting_with("SELECT")[0],
        r#"SELECT "widget_id", "label", "unit_price" FROM "legacy_widgets" WHERE "widget_id" IN (?)"#
    );
}

#[test]
fn debug_state_counts_cached_entities() {
    let store = store();
    store.register::<Gadget>().unwrap();
    seed_widget(store.connection(), 1, "a", 1);
    seed_widget(store.connection(), 2, "b", 2);
    store.refresh::<Widget>().unwrap();

    let info = store.debug_state();
    assert_eq!(info.registered_types, 2);
    assert_eq!(info.cached_entities, 2);
    assert_eq!(info.types[0].1, "widgets");
    assert_eq!(info.types[0].2, 2);
    assert_eq!(info.types[1].2, 0);
}

#[test]
fn entity_json_includes_id() {
    let store = store();
    seed_widget(store.connection(), 5, "cog", 2);
    let widget = store.get::<Widget>(&5, GetPolicy::FetchIfMissing).unwrap().unwrap();
    assert_eq!(
        widget.to_json(),
        serde_json::json!({"id": 5, "name": "cog", "price": 2})
    );
}
