//! Parsing of `#[derive(Model)]` input and `#[orm(...)]` attributes.

use proc_macro2::Span;
use syn::{Attribute, Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Type};

/// Parsed model definition.
pub struct ModelDef {
    pub name: Ident,
    pub table_name: String,
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn primary_key_fields(&self) -> Vec<&FieldDef> {
        self.fields.iter().filter(|f| f.primary_key).collect()
    }
}

/// Parsed field definition.
pub struct FieldDef {
    pub name: Ident,
    pub column_name: String,
    pub ty: Type,
    pub sql_type: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique: bool,
    pub server_default: Option<String>,
    pub foreign_key: Option<String>,
}

/// Parse the derive input into a model definition.
pub fn parse_model(input: &DeriveInput) -> Result<ModelDef> {
    let name = input.ident.clone();

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Model cannot be derived for generic structs",
        ));
    }

    let table_name = parse_struct_attrs(&input.attrs)?
        .unwrap_or_else(|| to_snake_case(&name.to_string()));

    let fields = match &input.data {
        Data::Struct(data) => parse_fields(&data.fields)?,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Model can only be derived for structs, not unions",
            ));
        }
    };

    let model = ModelDef {
        name,
        table_name,
        fields,
    };

    if model.primary_key_fields().is_empty() {
        return Err(Error::new_spanned(
            &input.ident,
            "Model requires at least one #[orm(primary_key)] field",
        ));
    }

    Ok(model)
}

/// Parse `#[orm(table = "...")]` on the struct.
fn parse_struct_attrs(attrs: &[Attribute]) -> Result<Option<String>> {
    let mut table_name = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                table_name = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unknown struct attribute; expected `table = \"...\"`"))
            }
        })?;
    }
    Ok(table_name)
}

fn parse_fields(fields: &Fields) -> Result<Vec<FieldDef>> {
    match fields {
        Fields::Named(named) => named.named.iter().map(parse_field).collect(),
        Fields::Unnamed(_) => Err(Error::new(
            Span::call_site(),
            "Model requires a struct with named fields, not a tuple struct",
        )),
        Fields::Unit => Err(Error::new(
            Span::call_site(),
            "Model requires a struct with fields, not a unit struct",
        )),
    }
}

#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    sql_type: Option<String>,
    nullable: Option<bool>,
    primary_key: bool,
    auto_increment: bool,
    unique: bool,
    server_default: Option<String>,
    foreign_key: Option<String>,
}

fn parse_field(field: &Field) -> Result<FieldDef> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let ty = field.ty.clone();
    let attrs = parse_field_attrs(&field.attrs)?;
    let is_option = is_option_type(&ty);

    if attrs.auto_increment && !is_option {
        return Err(Error::new_spanned(
            &field.ty,
            "auto_increment fields must be Option<_> so new rows can leave them unset",
        ));
    }
    if let Some(fk) = &attrs.foreign_key {
        if fk.split_once('.').is_none_or(|(t, c)| t.is_empty() || c.is_empty()) {
            return Err(Error::new_spanned(
                &name,
                "foreign_key must have the form \"table.column\"",
            ));
        }
    }

    // Option<_> columns are nullable unless the key or a server default fills them.
    let inferred_nullable = is_option && !attrs.primary_key && attrs.server_default.is_none();

    Ok(FieldDef {
        column_name: attrs.column.unwrap_or_else(|| name.to_string()),
        name,
        ty,
        sql_type: attrs.sql_type,
        nullable: attrs.nullable.unwrap_or(inferred_nullable),
        primary_key: attrs.primary_key,
        auto_increment: attrs.auto_increment,
        unique: attrs.unique,
        server_default: attrs.server_default,
        foreign_key: attrs.foreign_key,
    })
}

fn parse_field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("primary_key") {
                out.primary_key = true;
            } else if path.is_ident("auto_increment") {
                out.auto_increment = true;
            } else if path.is_ident("unique") {
                out.unique = true;
            } else if path.is_ident("nullable") {
                out.nullable = Some(true);
            } else if path.is_ident("not_null") {
                out.nullable = Some(false);
            } else if path.is_ident("column") {
                out.column = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("sql_type") {
                out.sql_type = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("server_default") {
                out.server_default = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if path.is_ident("foreign_key") {
                out.foreign_key = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("unknown orm field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

/// Whether the type is spelled `Option<..>`.
pub fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

/// Convert PascalCase to snake_case (`UserAccount` -> `user_account`).
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let chars: Vec<char> = s.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next = chars.get(i + 1).copied();
                if prev.is_lowercase()
                    || (prev.is_uppercase() && next.is_some_and(|n| n.is_lowercase()))
                {
                    result.push('_');
                }
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Address"), "address");
        assert_eq!(to_snake_case("UserAccount"), "user_account");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
    }

    #[test]
    fn test_parse_user_model() {
        let input: DeriveInput = parse_quote! {
            #[orm(table = "user_account")]
            struct User {
                #[orm(primary_key, auto_increment)]
                id: Option<i64>,
                name: String,
                fullname: Option<String>,
                #[orm(server_default = "CURRENT_TIMESTAMP", sql_type = "TIMESTAMP")]
                created_at: Option<String>,
            }
        };
        let model = parse_model(&input).unwrap();
        assert_eq!(model.table_name, "user_account");
        assert_eq!(model.fields.len(), 4);

        let id = &model.fields[0];
        assert!(id.primary_key && id.auto_increment && !id.nullable);
        assert!(!model.fields[1].nullable);
        assert!(model.fields[2].nullable);
        let created = &model.fields[3];
        assert!(!created.nullable);
        assert_eq!(created.server_default.as_deref(), Some("CURRENT_TIMESTAMP"));
        assert_eq!(created.sql_type.as_deref(), Some("TIMESTAMP"));
    }

    #[test]
    fn test_default_table_name_and_foreign_key() {
        let input: DeriveInput = parse_quote! {
            struct Address {
                #[orm(primary_key, auto_increment)]
                id: Option<i64>,
                email_address: String,
                #[orm(foreign_key = "user_account.id")]
                user_id: i64,
            }
        };
        let model = parse_model(&input).unwrap();
        assert_eq!(model.table_name, "address");
        assert_eq!(
            model.fields[2].foreign_key.as_deref(),
            Some("user_account.id")
        );
    }

    #[test]
    fn test_rejects_missing_primary_key() {
        let input: DeriveInput = parse_quote! {
            struct Loose {
                name: String,
            }
        };
        assert!(parse_model(&input).is_err());
    }

    #[test]
    fn test_rejects_non_option_auto_increment() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[orm(primary_key, auto_increment)]
                id: i64,
            }
        };
        assert!(parse_model(&input).is_err());
    }

    #[test]
    fn test_rejects_malformed_foreign_key() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[orm(primary_key)]
                id: i64,
                #[orm(foreign_key = "user_account")]
                user_id: i64,
            }
        };
        assert!(parse_model(&input).is_err());
    }

    #[test]
    fn test_rejects_unknown_attribute() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                #[orm(primary_key, shiny)]
                id: i64,
            }
        };
        assert!(parse_model(&input).is_err());
    }
}
