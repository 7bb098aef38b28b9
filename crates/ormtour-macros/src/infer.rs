//! SQL type inference from Rust field types.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{GenericArgument, PathArguments, Type};

/// Infer the SQL type from a Rust type, returning tokens that construct
/// the matching `SqlType` variant. `Option<T>` is unwrapped first.
pub fn infer_sql_type(ty: &Type) -> TokenStream {
    let inner_ty = unwrap_option_type(ty);

    match type_to_string(inner_ty).as_str() {
        "bool" => quote! { ::ormtour_core::SqlType::Boolean },
        "i8" | "i16" | "i32" | "u8" | "u16" => quote! { ::ormtour_core::SqlType::Integer },
        "i64" | "u32" | "isize" => quote! { ::ormtour_core::SqlType::BigInt },
        "f32" => quote! { ::ormtour_core::SqlType::Real },
        "f64" => quote! { ::ormtour_core::SqlType::Double },
        "Vec<u8>" => quote! { ::ormtour_core::SqlType::Blob },
        "serde_json::Value" => quote! { ::ormtour_core::SqlType::Json },
        // String and anything unrecognized are stored as text
        _ => quote! { ::ormtour_core::SqlType::Text },
    }
}

/// Parse an explicit `sql_type = "..."` attribute into `SqlType` tokens.
///
/// Recognized names map to their variant; anything else becomes
/// `SqlType::Custom` and is emitted verbatim in DDL.
pub fn parse_sql_type_attr(sql_type: &str) -> TokenStream {
    let upper = sql_type.trim().to_uppercase();

    if let Some(len) = upper
        .strip_prefix("VARCHAR(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|n| n.trim().parse::<u32>().ok())
    {
        return quote! { ::ormtour_core::SqlType::VarChar(#len) };
    }

    match upper.as_str() {
        "INTEGER" | "INT" => quote! { ::ormtour_core::SqlType::Integer },
        "BIGINT" => quote! { ::ormtour_core::SqlType::BigInt },
        "REAL" | "FLOAT" => quote! { ::ormtour_core::SqlType::Real },
        "DOUBLE" | "DOUBLE PRECISION" => quote! { ::ormtour_core::SqlType::Double },
        "BOOLEAN" | "BOOL" => quote! { ::ormtour_core::SqlType::Boolean },
        "TEXT" => quote! { ::ormtour_core::SqlType::Text },
        "BLOB" => quote! { ::ormtour_core::SqlType::Blob },
        "TIMESTAMP" | "DATETIME" => quote! { ::ormtour_core::SqlType::Timestamp },
        "JSON" => quote! { ::ormtour_core::SqlType::Json },
        _ => {
            let custom = sql_type.trim();
            quote! { ::ormtour_core::SqlType::Custom(#custom) }
        }
    }
}

/// Unwrap Option<T> to get the inner type, or return the original type.
fn unwrap_option_type(ty: &Type) -> &Type {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return inner;
                    }
                }
            }
        }
    }
    ty
}

fn type_to_string(ty: &Type) -> String {
    use quote::ToTokens;
    ty.to_token_stream().to_string().replace(' ', "")
}
