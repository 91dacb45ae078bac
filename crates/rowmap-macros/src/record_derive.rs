//! Implementation of the Record derive macro.
//!
//! This module turns a struct with `#[rowmap(...)]` attributes into a
//! `Record` implementation plus typed accessor traits.

use proc_macro2::{Literal, TokenStream};
use quote::{ToTokens, format_ident, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Type, Visibility};

/// Parsed definition of a struct with `#[derive(Record)]`.
#[derive(Debug)]
pub struct RecordDef {
    /// The struct name.
    pub name: Ident,
    /// The struct visibility, reused for the accessor traits.
    pub vis: Visibility,
    /// Table name.
    pub table: String,
    /// Identifier type.
    pub id_type: Type,
    /// Id column name.
    pub id_column: String,
    /// Non-id fields in declaration order.
    pub fields: Vec<RecordFieldDef>,
}

/// Parsed definition of one record field.
#[derive(Debug)]
pub struct RecordFieldDef {
    /// The field name.
    pub ident: Ident,
    /// The field type.
    pub ty: Type,
    /// Column name.
    pub column: String,
}

impl RecordFieldDef {
    fn name(&self) -> String {
        self.ident.unraw().to_string()
    }
}

/// Parse a `DeriveInput` into a `RecordDef`.
pub fn parse_record(input: &DeriveInput) -> Result<RecordDef> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let data = match &input.data {
        Data::Struct(data) => data,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not unions",
            ));
        }
    };

    let mut table = None;
    let mut id_type = None;
    let mut id_column = None;
    for attr in &input.attrs {
        if !attr.path().is_ident("rowmap") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("table") {
                table = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("id") {
                id_type = Some(meta.value()?.parse::<Type>()?);
            } else if path.is_ident("id_column") {
                id_column = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(Error::new_spanned(
                    path,
                    format!(
                        "unknown rowmap attribute `{attr_name}`. \
                         Valid struct attributes are: table, id, id_column"
                    ),
                ));
            }
            Ok(())
        })?;
    }

    let id_column = id_column.unwrap_or_else(|| "id".to_string());
    let fields = match &data.fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(parse_record_field)
            .collect::<Result<Vec<_>>>()?,
        Fields::Unnamed(_) => {
            return Err(Error::new_spanned(
                &data.fields,
                "Record requires a struct with named fields",
            ));
        }
        Fields::Unit => Vec::new(),
    };

    if let Some(clash) = fields.iter().find(|f| f.column == id_column) {
        return Err(Error::new_spanned(
            &clash.ident,
            format!(
                "field `{}` maps to the id column `{}`; the id is not a record field",
                clash.name(),
                id_column
            ),
        ));
    }

    Ok(RecordDef {
        name: input.ident.clone(),
        vis: input.vis.clone(),
        table: table.unwrap_or_else(|| to_snake_case(&input.ident.to_string())),
        id_type: id_type.unwrap_or_else(|| syn::parse_quote!(i64)),
        id_column,
        fields,
    })
}

/// Parse a single field and its `#[rowmap(...)]` attributes.
fn parse_record_field(field: &Field) -> Result<RecordFieldDef> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;

    let mut column = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("rowmap") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                column = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else {
                let attr_name = meta.path.to_token_stream().to_string();
                Err(Error::new_spanned(
                    &meta.path,
                    format!(
                        "unknown rowmap attribute `{attr_name}`. \
                         Valid field attributes are: column"
                    ),
                ))
            }
        })?;
    }

    Ok(RecordFieldDef {
        column: column.unwrap_or_else(|| ident.unraw().to_string()),
        ident,
        ty: field.ty.clone(),
    })
}

/// `OrderLine` -> `order_line`.
fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Generate the `Record` implementation and accessor traits.
pub fn generate_record_impl(def: &RecordDef) -> TokenStream {
    let name = &def.name;
    let name_str = name.to_string();
    let id_type = &def.id_type;
    let table = &def.table;
    let id_column = &def.id_column;
    let count = Literal::usize_unsuffixed(def.fields.len());

    let field_infos = def.fields.iter().map(|f| {
        let ty = &f.ty;
        let field_name = f.name();
        let column = &f.column;
        quote! {
            ::rowmap::FieldInfo::new(#field_name, <#ty as ::rowmap::HasSqlType>::SQL_TYPE)
                .column(#column)
                .nullable(<#ty as ::rowmap::HasSqlType>::NULLABLE)
        }
    });

    let to_values = def.fields.iter().map(|f| {
        let ident = &f.ident;
        quote! { ::rowmap::Value::from(::std::clone::Clone::clone(&self.#ident)) }
    });

    let from_values = def.fields.iter().enumerate().map(|(idx, f)| {
        let ident = &f.ident;
        let ty = &f.ty;
        let idx = Literal::usize_unsuffixed(idx);
        quote! { #ident: <#ty as ::rowmap::FromValue>::from_value(&values[#idx])? }
    });

    let record_impl = quote! {
        #[automatically_derived]
        impl ::rowmap::Record for #name {
            type Id = #id_type;
            const TABLE_NAME: &'static str = #table;
            const ID_COLUMN: &'static str = #id_column;

            fn fields() -> &'static [::rowmap::FieldInfo] {
                static FIELDS: [::rowmap::FieldInfo; #count] = [#(#field_infos),*];
                &FIELDS
            }

            fn to_values(&self) -> ::std::vec::Vec<::rowmap::Value> {
                ::std::vec![#(#to_values),*]
            }

            fn from_values(values: &[::rowmap::Value]) -> ::rowmap::Result<Self> {
                if values.len() != #count {
                    return ::std::result::Result::Err(::rowmap::Error::consistency(::std::format!(
                        "{} expects {} values, got {}",
                        #name_str,
                        #count,
                        values.len()
                    )));
                }
                ::std::result::Result::Ok(Self { #(#from_values),* })
            }
        }
    };

    let accessors = generate_accessors(def);
    quote! {
        #record_impl
        #accessors
    }
}

/// Generate `<Name>Fields` and `<Name>FieldsMut`.
fn generate_accessors(def: &RecordDef) -> TokenStream {
    let name = &def.name;
    let vis = &def.vis;
    let read_trait = format_ident!("{}Fields", name);
    let write_trait = format_ident!("{}FieldsMut", name);
    let read_doc = format!("Typed getters for the fields of [`{}`].", name);
    let write_doc = format!("Typed setters for the fields of [`{}`].", name);

    let getter_sigs: Vec<TokenStream> = def
        .fields
        .iter()
        .map(|f| {
            let ident = &f.ident;
            let ty = &f.ty;
            quote! { fn #ident(&self) -> ::rowmap::Result<#ty> }
        })
        .collect();
    let getter_bodies = def.fields.iter().map(|f| {
        let field_name = f.name();
        let ty = &f.ty;
        quote! { ::rowmap::FieldRead::read_as::<#ty>(self, #field_name) }
    });

    let setter_sigs: Vec<TokenStream> = def
        .fields
        .iter()
        .map(|f| {
            let setter = format_ident!("set_{}", f.ident.unraw());
            let ty = &f.ty;
            quote! { fn #setter(&mut self, value: #ty) -> ::rowmap::Result<()> }
        })
        .collect();
    let setter_bodies = def.fields.iter().map(|f| {
        let field_name = f.name();
        quote! { ::rowmap::FieldWrite::write(self, #field_name, ::rowmap::Value::from(value)) }
    });

    quote! {
        #[doc = #read_doc]
        #vis trait #read_trait: ::rowmap::FieldRead<Record = #name> {
            #(#getter_sigs;)*
        }

        #[automatically_derived]
        impl<T: ::rowmap::FieldRead<Record = #name>> #read_trait for T {
            #(#getter_sigs { #getter_bodies })*
        }

        #[doc = #write_doc]
        #vis trait #write_trait: ::rowmap::FieldWrite<Record = #name> {
            #(#setter_sigs;)*
        }

        #[automatically_derived]
        impl<T: ::rowmap::FieldWrite<Record = #name>> #write_trait for T {
            #(#setter_sigs { #setter_bodies })*
        }
    }
}
