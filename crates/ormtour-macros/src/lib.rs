//! Procedural macros for ormtour.
//!
//! `#[derive(Model)]` turns a struct with named fields into a table
//! mapping: static column metadata, row conversion, primary key access,
//! and one `Column` constant per field for building queries.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;

mod infer;
mod parse;

use parse::{FieldDef, ModelDef, parse_model};

/// Derive macro for the `Model` trait.
///
/// # Attributes
///
/// - `#[orm(table = "name")]` - Table name (defaults to the snake_case struct name)
/// - `#[orm(primary_key)]` - Mark field as primary key
/// - `#[orm(auto_increment)]` - Database-assigned key; the field must be `Option<_>`
/// - `#[orm(column = "name")]` - Override column name
/// - `#[orm(sql_type = "TIMESTAMP")]` - Override the inferred SQL type
/// - `#[orm(nullable)]` / `#[orm(not_null)]` - Override inferred nullability
/// - `#[orm(unique)]` - Add unique constraint
/// - `#[orm(server_default = "expr")]` - Server-side default expression
/// - `#[orm(foreign_key = "table.column")]` - Add foreign key reference
///
/// # Example
///
/// ```ignore
/// #[derive(Model, Debug, Clone)]
/// #[orm(table = "address")]
/// struct Address {
///     #[orm(primary_key, auto_increment)]
///     id: Option<i64>,
///     email_address: String,
///     #[orm(foreign_key = "user_account.id")]
///     user_id: i64,
/// }
///
/// let filter = Address::USER_ID.eq(3_i64);
/// ```
#[proc_macro_derive(Model, attributes(orm))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let model = match parse_model(&input) {
        Ok(m) => m,
        Err(e) => return e.to_compile_error().into(),
    };

    generate_model_impl(&model).into()
}

fn generate_model_impl(model: &ModelDef) -> proc_macro2::TokenStream {
    let name = &model.name;
    let table_name = &model.table_name;

    let pk_columns: Vec<&str> = model
        .primary_key_fields()
        .iter()
        .map(|f| f.column_name.as_str())
        .collect();

    let field_infos = generate_field_infos(model);
    let field_count = model.fields.len();
    let to_row = generate_to_row(model);
    let from_row = generate_from_row(model);
    let primary_key_value = generate_primary_key_value(model);
    let is_new = generate_is_new(model);
    let clear_primary_key = generate_clear_primary_key(model);
    let column_consts = generate_column_consts(model);

    quote! {
        impl ::ormtour_core::Model for #name {
            const TABLE_NAME: &'static str = #table_name;
            const PRIMARY_KEY: &'static [&'static str] = &[#(#pk_columns),*];

            fn fields() -> &'static [::ormtour_core::FieldInfo] {
                static FIELDS: [::ormtour_core::FieldInfo; #field_count] = [#(#field_infos),*];
                &FIELDS
            }

            fn to_row(&self) -> ::std::vec::Vec<(&'static str, ::ormtour_core::Value)> {
                #to_row
            }

            fn from_row(row: &::ormtour_core::Row) -> ::ormtour_core::Result<Self> {
                #from_row
            }

            fn primary_key_value(&self) -> ::std::vec::Vec<::ormtour_core::Value> {
                #primary_key_value
            }

            fn is_new(&self) -> bool {
                #is_new
            }

            fn clear_primary_key(&mut self) {
                #clear_primary_key
            }
        }

        impl #name {
            #(#column_consts)*
        }
    }
}

fn opt_str(value: Option<&String>) -> proc_macro2::TokenStream {
    match value {
        Some(s) => quote! { ::std::option::Option::Some(#s) },
        None => quote! { ::std::option::Option::None },
    }
}

fn generate_field_infos(model: &ModelDef) -> Vec<proc_macro2::TokenStream> {
    model
        .fields
        .iter()
        .map(|field| {
            let field_name = field.name.unraw().to_string();
            let column_name = &field.column_name;
            let sql_type = match &field.sql_type {
                Some(explicit) => infer::parse_sql_type_attr(explicit),
                None => infer::infer_sql_type(&field.ty),
            };
            let nullable = field.nullable;
            let primary_key = field.primary_key;
            let auto_increment = field.auto_increment;
            let unique = field.unique;
            let server_default = opt_str(field.server_default.as_ref());
            let foreign_key = opt_str(field.foreign_key.as_ref());

            quote! {
                ::ormtour_core::FieldInfo::new(#field_name, #column_name, #sql_type)
                    .nullable(#nullable)
                    .primary_key(#primary_key)
                    .auto_increment(#auto_increment)
                    .unique(#unique)
                    .server_default(#server_default)
                    .foreign_key(#foreign_key)
            }
        })
        .collect()
}

fn generate_to_row(model: &ModelDef) -> proc_macro2::TokenStream {
    let conversions = model.fields.iter().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        quote! {
            (#column_name, ::ormtour_core::Value::from(self.#field_name.clone()))
        }
    });

    quote! {
        vec![#(#conversions),*]
    }
}

fn generate_from_row(model: &ModelDef) -> proc_macro2::TokenStream {
    let extractions = model.fields.iter().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        quote! {
            #field_name: row.get_named(#column_name)?
        }
    });

    quote! {
        Ok(Self {
            #(#extractions,)*
        })
    }
}

fn generate_primary_key_value(model: &ModelDef) -> proc_macro2::TokenStream {
    let values = model.primary_key_fields().into_iter().map(|field| {
        let field_name = &field.name;
        quote! { ::ormtour_core::Value::from(self.#field_name.clone()) }
    });

    quote! {
        vec![#(#values),*]
    }
}

fn generate_is_new(model: &ModelDef) -> proc_macro2::TokenStream {
    let optional_pks: Vec<&FieldDef> = model
        .primary_key_fields()
        .into_iter()
        .filter(|f| parse::is_option_type(&f.ty))
        .collect();

    if optional_pks.is_empty() {
        return quote! { false };
    }

    let checks = optional_pks.iter().map(|field| {
        let field_name = &field.name;
        quote! { self.#field_name.is_none() }
    });
    quote! { #(#checks)||* }
}

fn generate_clear_primary_key(model: &ModelDef) -> proc_macro2::TokenStream {
    let resets = model
        .primary_key_fields()
        .into_iter()
        .filter(|f| f.auto_increment)
        .map(|field| {
            let field_name = &field.name;
            quote! { self.#field_name = ::std::option::Option::None; }
        });

    quote! { #(#resets)* }
}

fn generate_column_consts(model: &ModelDef) -> Vec<proc_macro2::TokenStream> {
    let table_name = &model.table_name;
    model
        .fields
        .iter()
        .map(|field| {
            let const_name = format_ident!("{}", field.name.unraw().to_string().to_uppercase());
            let column_name = &field.column_name;
            let doc = format!("The `{}.{}` column.", table_name, column_name);
            quote! {
                #[doc = #doc]
                pub const #const_name: ::ormtour_core::Column =
                    ::ormtour_core::Column::new(#table_name, #column_name);
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand(input: syn::DeriveInput) -> String {
        let model = parse_model(&input).unwrap();
        generate_model_impl(&model).to_string()
    }

    #[test]
    fn test_generates_column_constants() {
        let code = expand(parse_quote! {
            #[orm(table = "user_account")]
            struct User {
                #[orm(primary_key, auto_increment)]
                id: Option<i64>,
                name: String,
            }
        });
        assert!(code.contains("pub const ID"));
        assert!(code.contains("pub const NAME"));
        assert!(code.contains("\"user_account\""));
    }

    #[test]
    fn test_is_new_checks_optional_key() {
        let code = expand(parse_quote! {
            struct Address {
                #[orm(primary_key, auto_increment)]
                id: Option<i64>,
            }
        });
        assert!(code.contains("is_none"));
        assert!(code.contains("self . id ="));
    }

    #[test]
    fn test_required_key_is_never_new() {
        let code = expand(parse_quote! {
            struct Code {
                #[orm(primary_key)]
                code: String,
            }
        });
        assert!(!code.contains("is_none"));
        assert!(!code.contains("self . code ="));
    }
}
