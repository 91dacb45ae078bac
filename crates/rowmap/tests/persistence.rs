//! Creation, persist and delete through the facade.

mod common;

use common::*;
use rowmap::prelude::*;
use rowmap_session::testing::KeyWidth;

#[test]
fn create_modify_persist_round_trip() {
    let store = store();

    let created = store.new_objects::<Widget>(vec![None]).unwrap();
    assert_eq!(created.len(), 1);
    let widget = &created[0];
    assert_eq!(*widget.id(), 1);
    assert_eq!(widget.name().unwrap(), "");
    assert_eq!(widget.price().unwrap(), 0);

    let mut draft = widget.modify();
    draft.set_price(12).unwrap();
    assert_eq!(draft.dirty_fields(), vec!["price"]);
    assert_eq!(widget.price().unwrap(), 0);

    let persisted = store.persist(vec![draft.finish()]).unwrap();
    assert!(Entity::ptr_eq(&persisted[0], widget));
    assert_eq!(widget.price().unwrap(), 12);
    assert_eq!(stored_price(store.connection(), 1), Some(Value::Int(12)));

    let cached = store.get::<Widget>(&1, GetPolicy::LocalOnly).unwrap().unwrap();
    assert!(Entity::ptr_eq(&cached, widget));
}

#[test]
fn new_objects_mixes_explicit_and_generated_ids() {
    let store = store();
    let created = store
        .new_objects::<Widget>(vec![Some(10), None, Some(11)])
        .unwrap();

    let ids: Vec<i64> = created.iter().map(|w| *w.id()).collect();
    assert_eq!(ids, vec![10, 12, 11]);
    assert_eq!(store.connection().row_count("widgets"), 3);
    assert_eq!(store.connection().commits(), 1);
    assert_eq!(store.cached_count::<Widget>().unwrap(), 3);
}

#[test]
fn new_objects_count_and_single_helpers() {
    let store = store();
    assert_eq!(store.new_objects_count::<Widget>(3).unwrap().len(), 3);
    assert_eq!(*store.new_object::<Widget>().unwrap().id(), 4);
    assert_eq!(*store.new_object_with_id::<Widget>(50).unwrap().id(), 50);
}

#[test]
fn explicit_id_conflict_rolls_back_creation() {
    let store = store();
    seed_widget(store.connection(), 7, "taken", 1);

    let err = store
        .new_objects::<Widget>(vec![Some(6), Some(7)])
        .unwrap_err();
    assert!(err.is_storage());
    assert_eq!(store.connection().row_count("widgets"), 1);
    assert_eq!(store.cached_count::<Widget>().unwrap(), 0);
}

#[test]
fn missing_generated_keys_are_a_consistency_error() {
    let store = store();
    store.connection().set_key_width("widgets", KeyWidth::Unreported);

    let err = store.new_object::<Widget>().unwrap_err();
    assert!(err.is_consistency());
    assert_eq!(store.connection().row_count("widgets"), 0);
    assert_eq!(store.connection().rollbacks(), 1);
    assert_eq!(store.cached_count::<Widget>().unwrap(), 0);
}

#[test]
fn generated_keys_are_normalized_to_the_id_type() {
    let store = store();
    store.register::<Gadget>().unwrap();
    store.connection().set_key_width("widgets", KeyWidth::Int32);
    store.connection().set_key_width("gadgets", KeyWidth::BigNum);

    assert_eq!(*store.new_object::<Widget>().unwrap().id(), 1_i64);
    let gadget = store.new_object::<Gadget>().unwrap();
    assert_eq!(*gadget.id(), 1_i32);
    assert_eq!(gadget.label().unwrap(), None);
}

#[test]
fn strict_normalization_rejects_lossy_keys() {
    let conn = connection();
    conn.seed("gadgets", vec![Value::BigInt(5_000_000_000), Value::Null]);
    let store = EntityStore::with_config(
        conn,
        StoreConfig::default().with_strict_id_normalization(true),
    );
    store.register::<Gadget>().unwrap();

    let err = store.new_object::<Gadget>().unwrap_err();
    assert!(err.is_consistency());
    assert_eq!(store.connection().row_count("gadgets"), 1);
}

#[test]
fn permissive_normalization_leaves_rejection_to_the_id_type() {
    let conn = connection();
    conn.seed("gadgets", vec![Value::BigInt(5_000_000_000), Value::Null]);
    let store = EntityStore::new(conn);
    store.register::<Gadget>().unwrap();

    let err = store.new_object::<Gadget>().unwrap_err();
    assert!(matches!(err, Error::Type(_)));
}

#[test]
fn persist_writes_inserts_before_updates_in_one_transaction() {
    let store = store();
    let existing = store.new_object::<Widget>().unwrap();
    let conn = store.connection();
    conn.clear_log();

    let mut generated = store.stage::<Widget>(None).unwrap();
    generated.set_name("nut".to_string()).unwrap();
    let mut explicit = store.stage::<Widget>(Some(40)).unwrap();
    explicit.set_price(4).unwrap();
    let mut update = existing.modify();
    update.set_name("washer".to_string()).unwrap();

    let out = store
        .persist(vec![generated.finish(), update.finish(), explicit.finish()])
        .unwrap();

    assert_eq!(out.len(), 3);
    assert_eq!(*out[0].id(), 41);
    assert!(Entity::ptr_eq(&out[1], &existing));
    assert_eq!(*out[2].id(), 40);
    assert_eq!(out[0].name().unwrap(), "nut");
    assert_eq!(out[0].price().unwrap(), 0);
    assert_eq!(out[2].price().unwrap(), 4);
    assert_eq!(existing.name().unwrap(), "washer");

    let log = conn.statements();
    assert_eq!(log.len(), 5);
    assert_eq!(log[0], "BEGIN ISOLATION LEVEL READ UNCOMMITTED");
    assert!(log[1].starts_with(r#"INSERT INTO "widgets" ("id", "name", "price")"#));
    assert!(log[2].starts_with(r#"INSERT INTO "widgets" ("name", "price")"#));
    assert_eq!(
        log[3],
        r#"UPDATE "widgets" SET "name" = ?, "price" = ? WHERE "id" = ?"#
    );
    assert_eq!(log[4], "COMMIT");
}

#[test]
fn clean_drafts_are_not_written() {
    let store = store();
    let widget = store.new_object::<Widget>().unwrap();
    store.connection().clear_log();

    let draft = widget.modify();
    assert!(!draft.is_dirty());
    let out = store.persist(vec![draft.finish()]).unwrap();
    assert!(Entity::ptr_eq(&out[0], &widget));
    assert!(store.connection().statements().is_empty());
}

#[test]
fn assign_marks_only_changed_fields() {
    let store = store();
    let widget = store.new_object::<Widget>().unwrap();

    let mut draft = widget.modify();
    draft.assign(&Widget {
        name: String::new(),
        price: 5,
    });
    assert_eq!(draft.dirty_fields(), vec!["price"]);
    store.persist(vec![draft.finish()]).unwrap();
    assert_eq!(widget.price().unwrap(), 5);
}

#[test]
fn failed_batch_update_rolls_back_and_keeps_cache() {
    let store = store();
    let conn = store.connection();
    seed_widget(conn, 1, "a", 1);
    seed_widget(conn, 2, "b", 2);
    let first = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();
    let second = store.get::<Widget>(&2, GetPolicy::FetchIfMissing).unwrap().unwrap();

    let mut d1 = first.modify();
    d1.set_price(10).unwrap();
    let mut d2 = second.modify();
    d2.set_price(20).unwrap();

    conn.fail_after("UPDATE", 1);
    let err = store.persist(vec![d1.finish(), d2.finish()]).unwrap_err();

    assert!(err.is_storage());
    assert_eq!(first.price().unwrap(), 1);
    assert_eq!(second.price().unwrap(), 2);
    assert_eq!(stored_price(conn, 1), Some(Value::Int(1)));
    assert_eq!(stored_price(conn, 2), Some(Value::Int(2)));
    assert_eq!(conn.rollbacks(), 1);
    assert_eq!(conn.commits(), 0);
}

#[test]
fn updates_from_an_evicted_handle_land_on_the_cached_instance() {
    let store = store();
    let conn = store.connection();
    seed_widget(conn, 1, "a", 1);
    let stale = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();

    conn.remove_row("widgets", &Value::BigInt(1));
    store.refresh::<Widget>().unwrap();
    assert!(stale.is_removed());
    seed_widget(conn, 1, "a", 1);
    let fresh = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();
    assert!(!Entity::ptr_eq(&stale, &fresh));

    let mut draft = stale.modify();
    draft.set_price(50).unwrap();
    let out = store.persist(vec![draft.finish()]).unwrap();

    assert!(Entity::ptr_eq(&out[0], &fresh));
    assert_eq!(fresh.price().unwrap(), 50);
    assert_eq!(stored_price(conn, 1), Some(Value::Int(50)));
    assert_eq!(store.cached_count::<Widget>().unwrap(), 1);
}

#[test]
fn updating_a_deleted_row_is_rejected() {
    let store = store();
    let conn = store.connection();
    seed_widget(conn, 1, "a", 1);
    seed_widget(conn, 2, "b", 2);
    let kept = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();
    let gone = store.get::<Widget>(&2, GetPolicy::FetchIfMissing).unwrap().unwrap();
    assert_eq!(store.delete::<Widget>(&[2]).unwrap(), 1);
    conn.clear_log();

    let mut d1 = kept.modify();
    d1.set_price(10).unwrap();
    let mut d2 = gone.modify();
    d2.set_price(20).unwrap();
    let err = store.persist(vec![d1.finish(), d2.finish()]).unwrap_err();

    assert!(err.is_consistency());
    assert!(err.to_string().contains("widgets"));
    assert_eq!(kept.price().unwrap(), 1);
    assert_eq!(stored_price(conn, 1), Some(Value::Int(1)));
    assert_eq!(conn.row_count("widgets"), 1);
    assert_eq!(conn.statements().last().map(String::as_str), Some("ROLLBACK"));
}

#[test]
fn commit_failure_leaves_cache_untouched() {
    let store = store();
    let widget = store.new_object::<Widget>().unwrap();
    store.connection().fail_on_commit(true);

    let mut draft = widget.modify();
    draft.set_price(99).unwrap();
    assert!(store.persist(vec![draft.finish()]).unwrap_err().is_storage());
    assert_eq!(widget.price().unwrap(), 0);

    assert!(store.new_object::<Widget>().unwrap_err().is_storage());
    assert_eq!(store.cached_count::<Widget>().unwrap(), 1);

    store.connection().clear_failures();
    let mut retry = widget.modify();
    retry.set_price(99).unwrap();
    store.persist(vec![retry.finish()]).unwrap();
    assert_eq!(widget.price().unwrap(), 99);
}

#[test]
fn delete_ignores_missing_ids_and_evicts() {
    let store = store();
    let conn = store.connection();
    seed_widget(conn, 1, "a", 1);
    let widget = store.get::<Widget>(&1, GetPolicy::FetchIfMissing).unwrap().unwrap();

    let deleted = store.delete::<Widget>(&[1, 5]).unwrap();

    assert_eq!(deleted, 1);
    assert!(widget.is_removed());
    assert_eq!(store.cached_count::<Widget>().unwrap(), 0);
    assert_eq!(conn.row_count("widgets"), 0);
    assert_eq!(conn.commits(), 1);
    assert_eq!(
        conn.statements_starting_with("DELETE"),
        vec![r#"DELETE FROM "widgets" WHERE "id" IN (?, ?)"#.to_string()]
    );
}

#[test]
fn delete_entities_marks_handles_removed() {
    let store = store();
    let widgets = store.new_objects_count::<Widget>(2).unwrap();

    assert_eq!(store.delete_entities(&widgets).unwrap(), 2);
    assert!(widgets.iter().all(Entity::is_removed));
    assert_eq!(store.connection().row_count("widgets"), 0);
}

#[test]
fn failed_delete_keeps_entities() {
    let store = store();
    let widget = store.new_object::<Widget>().unwrap();
    store.connection().fail_on("DELETE");

    assert!(store.delete::<Widget>(&[*widget.id()]).unwrap_err().is_storage());
    assert!(!widget.is_removed());
    assert_eq!(store.cached_count::<Widget>().unwrap(), 1);
    assert_eq!(store.connection().row_count("widgets"), 1);
}

#[test]
fn empty_batches_are_no_ops() {
    let store = store();

    assert!(store.persist::<Widget>(Vec::new()).unwrap().is_empty());
    assert_eq!(store.delete::<Widget>(&[]).unwrap(), 0);
    assert!(store.refresh_keys::<Widget>(&[]).unwrap().is_empty());
    assert!(store.new_objects::<Widget>(Vec::new()).unwrap().is_empty());
    assert!(store.connection().statements().is_empty());
    assert_eq!(store.connection().commits(), 0);
}
