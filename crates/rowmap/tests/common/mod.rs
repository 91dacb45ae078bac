//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use rowmap::prelude::*;
use rowmap::{ColumnInfo, SqlType};
use rowmap_session::testing::MemoryConnection;

#[derive(Record, Debug, Clone, Default, PartialEq)]
#[rowmap(table = "widgets", id = i64)]
pub struct Widget {
    pub name: String,
    pub price: i32,
}

#[derive(Record, Debug, Clone, Default, PartialEq)]
#[rowmap(table = "gadgets", id = i32)]
pub struct Gadget {
    pub label: Option<String>,
}

/// `widgets` and `gadgets` tables, both empty.
pub fn connection() -> MemoryConnection {
    MemoryConnection::new()
        .with_table(
            "widgets",
            vec![
                ColumnInfo::new("id", SqlType::BigInt)
                    .primary_key()
                    .auto_increment(),
                ColumnInfo::new("name", SqlType::Text),
                ColumnInfo::new("price", SqlType::Integer),
            ],
        )
        .with_table(
            "gadgets",
            vec![
                ColumnInfo::new("id", SqlType::Integer)
                    .primary_key()
                    .auto_increment(),
                ColumnInfo::new("label", SqlType::Text).nullable(),
            ],
        )
}

pub fn widget_defaults() -> FieldDefaults {
    FieldDefaults::new().with("name", "").with("price", 0)
}

/// A store over `conn` with `Widget` registered.
pub fn store_with(conn: MemoryConnection, config: StoreConfig) -> EntityStore<MemoryConnection> {
    let store = EntityStore::with_config(conn, config);
    store
        .register_full::<Widget>(TableMapping::of::<Widget>(), widget_defaults())
        .unwrap();
    store
}

pub fn store() -> EntityStore<MemoryConnection> {
    store_with(connection(), StoreConfig::default())
}

pub fn seed_widget(conn: &MemoryConnection, id: i64, name: &str, price: i32) {
    conn.seed(
        "widgets",
        vec![Value::BigInt(id), Value::Text(name.to_string()), Value::Int(price)],
    );
}

pub fn stored_price(conn: &MemoryConnection, id: i64) -> Option<Value> {
    conn.row("widgets", &Value::BigInt(id)).map(|row| row[2].clone())
}
