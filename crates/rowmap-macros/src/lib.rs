//! Procedural macros for rowmap.
//!
//! `#[derive(Record)]` binds a plain struct of non-id fields to a table:
//!
//! ```ignore
//! #[derive(Record, Debug, Clone, Default)]
//! #[rowmap(table = "widgets", id = i64)]
//! pub struct Widget {
//!     pub name: String,
//!     #[rowmap(column = "unit_price")]
//!     pub price: i32,
//! }
//! ```
//!
//! Struct attributes:
//!
//! - `table = "..."`: table name (default: the struct name in snake_case)
//! - `id = Type`: identifier type, one of `i32`, `i64`, `BigInt`, `String`
//!   (default `i64`)
//! - `id_column = "..."`: id column name (default `"id"`)
//!
//! Field attributes:
//!
//! - `column = "..."`: column name (default: the field name)
//!
//! Besides the `Record` implementation, the derive generates two accessor
//! traits, `<Name>Fields` (typed getters) and `<Name>FieldsMut` (typed
//! `set_<field>` setters), implemented for everything exposing the record's
//! fields: entities, drafts and anything else implementing `FieldRead` /
//! `FieldWrite` for the record.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod record_derive;

/// Derive `rowmap::Record` and the typed field accessor traits.
#[proc_macro_derive(Record, attributes(rowmap))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match record_derive::parse_record(&input) {
        Ok(def) => record_derive::generate_record_impl(&def).into(),
        Err(e) => e.to_compile_error().into(),
    }
}
