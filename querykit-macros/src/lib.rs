//! Procedural macros for querykit
//!
//! - `#[derive(Entity)]` - Describe a struct as a table and generate its
//!   typed query path

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, PathArguments,
    Type,
};

/// Derive `querykit::Entity` and generate a `Q<Name>` path struct.
///
/// # Usage
///
/// ```ignore
/// #[derive(Entity)]
/// #[entity(table = "member")]
/// pub struct Member {
///     #[entity(primary_key)]
///     pub id: i64,
///     pub username: Option<String>,
///     pub age: i32,
///     pub team_id: Option<i64>,
///     #[entity(many_to_one(join_column = "team_id"))]
///     pub team: Related<Option<Team>>,
/// }
/// ```
///
/// # Generated Code
///
/// ```ignore
/// #[derive(Debug, Clone, Copy)]
/// pub struct QMember {
///     pub id: Column<i64>,
///     pub username: Column<Option<String>>,
///     pub age: Column<i32>,
///     pub team_id: Column<Option<i64>>,
///     pub team: Association<Member, Team>,
///     /* alias */
/// }
///
/// impl QMember {
///     pub const fn new(alias: &'static str) -> Self { /* ... */ }
/// }
/// ```
///
/// The table name defaults to the snake_case struct name. The primary key is
/// the field marked `primary_key`, or the field named `id`, and must be `i64`.
/// Association fields are `Related<Option<T>>` for many-to-one and
/// `Related<Vec<T>>` for one-to-many; they are not columns.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Clone, Copy, PartialEq)]
enum RelationKind {
    ManyToOne,
    OneToMany,
}

enum FieldKind {
    Column { primary_key: bool },
    Relation {
        kind: RelationKind,
        join_column: String,
        target: Type,
    },
}

struct EntityField {
    ident: Ident,
    ty: Type,
    kind: FieldKind,
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let vis = &input.vis;
    let path_name = format_ident!("Q{}", name);

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let table = parse_table(input)?.unwrap_or_else(|| name.to_string().to_case(Case::Snake));

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity requires a struct with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Entity can only be derived for structs")),
    };

    let mut fields = Vec::with_capacity(named.len());
    for field in named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
        let kind = parse_field_kind(field)?;
        fields.push(EntityField {
            ident,
            ty: field.ty.clone(),
            kind,
        });
    }

    let primary_key = find_primary_key(name, &mut fields)?;
    let primary_key_name = primary_key.to_string();
    let name_str = name.to_string();

    let columns: Vec<&EntityField> = fields
        .iter()
        .filter(|f| matches!(f.kind, FieldKind::Column { .. }))
        .collect();

    // Descriptor entries
    let field_descriptors = columns.iter().map(|f| {
        let column = f.ident.to_string();
        let ty = &f.ty;
        let is_key = matches!(f.kind, FieldKind::Column { primary_key: true });
        quote! {
            ::querykit::FieldDescriptor {
                name: #column,
                kind: <#ty as ::querykit::SqlType>::KIND,
                nullable: <#ty as ::querykit::SqlType>::NULLABLE,
                primary_key: #is_key,
            }
        }
    });

    let association_descriptors = fields.iter().filter_map(|f| match &f.kind {
        FieldKind::Relation {
            kind,
            join_column,
            target,
        } => {
            let association = f.ident.to_string();
            let kind = match kind {
                RelationKind::ManyToOne => quote!(::querykit::AssociationKind::ManyToOne),
                RelationKind::OneToMany => quote!(::querykit::AssociationKind::OneToMany),
            };
            Some(quote! {
                ::querykit::AssociationDescriptor {
                    name: #association,
                    kind: #kind,
                    join_column: #join_column,
                    target: <#target as ::querykit::Entity>::descriptor,
                }
            })
        }
        FieldKind::Column { .. } => None,
    });

    // Row decoding, in declaration order
    let decode_fields = fields.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        match f.kind {
            FieldKind::Column { .. } => quote! { #ident: reader.read::<#ty>()? },
            FieldKind::Relation { .. } => quote! { #ident: ::querykit::Related::NotLoaded },
        }
    });

    let load_arms = fields.iter().filter_map(|f| match &f.kind {
        FieldKind::Relation {
            kind: RelationKind::ManyToOne,
            target,
            ..
        } => {
            let ident = &f.ident;
            let association = ident.to_string();
            Some(quote! {
                #association => {
                    self.#ident = ::querykit::Related::Loaded(
                        ::querykit::decode_nullable::<#target>(reader)?,
                    );
                    Ok(())
                }
            })
        }
        _ => None,
    });

    let column_values = columns
        .iter()
        .filter(|f| matches!(f.kind, FieldKind::Column { primary_key: false }))
        .map(|f| {
            let ident = &f.ident;
            quote! { ::querykit::SqlType::to_sql(&self.#ident) }
        });

    // Path struct
    let path_fields = fields.iter().map(|f| {
        let ident = &f.ident;
        match &f.kind {
            FieldKind::Column { .. } => {
                let ty = &f.ty;
                quote! { pub #ident: ::querykit::Column<#ty> }
            }
            FieldKind::Relation { target, .. } => {
                quote! { pub #ident: ::querykit::Association<#name, #target> }
            }
        }
    });

    let path_inits = fields.iter().map(|f| {
        let ident = &f.ident;
        let field_name = ident.to_string();
        match f.kind {
            FieldKind::Column { .. } => {
                quote! { #ident: ::querykit::Column::new(alias, #field_name) }
            }
            FieldKind::Relation { .. } => {
                quote! { #ident: ::querykit::Association::new(alias, #field_name) }
            }
        }
    });

    let path_doc = format!("Query path for [`{name}`].");

    Ok(quote! {
        impl ::querykit::Entity for #name {
            fn descriptor() -> &'static ::querykit::EntityDescriptor {
                static DESCRIPTOR: ::querykit::EntityDescriptor = ::querykit::EntityDescriptor {
                    name: #name_str,
                    table: #table,
                    primary_key: #primary_key_name,
                    fields: &[#(#field_descriptors),*],
                    associations: &[#(#association_descriptors),*],
                };
                &DESCRIPTOR
            }

            fn decode(
                reader: &mut ::querykit::RowReader<'_>,
            ) -> ::std::result::Result<Self, ::querykit::QueryError> {
                ::std::result::Result::Ok(Self {
                    #(#decode_fields),*
                })
            }

            #[allow(unused_variables)]
            fn load_association(
                &mut self,
                name: &str,
                reader: &mut ::querykit::RowReader<'_>,
            ) -> ::std::result::Result<(), ::querykit::QueryError> {
                match name {
                    #(#load_arms)*
                    _ => ::std::result::Result::Err(::querykit::QueryError::from(
                        ::querykit::BuildError::Unsupported(::std::format!(
                            "association `{}` of {} cannot be fetch-joined",
                            name,
                            #name_str
                        )),
                    )),
                }
            }

            fn column_values(&self) -> ::std::vec::Vec<::querykit::SqlValue> {
                ::std::vec![#(#column_values),*]
            }

            fn set_primary_key(&mut self, id: i64) {
                self.#primary_key = id;
            }
        }

        #[doc = #path_doc]
        #[derive(Debug, Clone, Copy)]
        #vis struct #path_name {
            #(#path_fields,)*
            path_alias: &'static str,
        }

        impl #path_name {
            pub const fn new(alias: &'static str) -> Self {
                Self {
                    #(#path_inits,)*
                    path_alias: alias,
                }
            }
        }

        impl ::std::default::Default for #path_name {
            fn default() -> Self {
                Self::new(#table)
            }
        }

        impl ::querykit::EntityPath for #path_name {
            type Entity = #name;

            fn alias(&self) -> &'static str {
                self.path_alias
            }
        }

        impl ::querykit::Projection for #path_name {
            type Output = #name;

            fn select_items(&self, context: &mut ::querykit::SelectContext<'_>) {
                context.push_entity(
                    self.path_alias,
                    <#name as ::querykit::Entity>::descriptor(),
                );
            }

            fn decode(
                &self,
                reader: &mut ::querykit::RowReader<'_>,
                joins: &[::querykit::Join],
            ) -> ::std::result::Result<#name, ::querykit::QueryError> {
                ::querykit::decode_entity::<#name>(self.path_alias, reader, joins)
            }
        }
    })
}

/// `#[entity(table = "...")]` on the struct
fn parse_table(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut table = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `table = \"...\"`"))
            }
        })?;
    }
    Ok(table)
}

fn parse_field_kind(field: &syn::Field) -> syn::Result<FieldKind> {
    let mut primary_key = false;
    let mut relation: Option<(RelationKind, String)> = None;

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            let kind = if meta.path.is_ident("primary_key") {
                primary_key = true;
                return Ok(());
            } else if meta.path.is_ident("many_to_one") {
                RelationKind::ManyToOne
            } else if meta.path.is_ident("one_to_many") {
                RelationKind::OneToMany
            } else {
                return Err(meta.error("expected `primary_key`, `many_to_one` or `one_to_many`"));
            };

            let mut join_column = None;
            meta.parse_nested_meta(|inner| {
                if inner.path.is_ident("join_column") {
                    let value: LitStr = inner.value()?.parse()?;
                    join_column = Some(value.value());
                    Ok(())
                } else {
                    Err(inner.error("expected `join_column = \"...\"`"))
                }
            })?;

            let join_column =
                join_column.ok_or_else(|| meta.error("missing `join_column = \"...\"`"))?;
            relation = Some((kind, join_column));
            Ok(())
        })?;
    }

    match relation {
        Some(_) if primary_key => Err(syn::Error::new_spanned(
            field,
            "an association cannot be the primary key",
        )),
        Some((kind, join_column)) => {
            let wrapper = match kind {
                RelationKind::ManyToOne => "Option",
                RelationKind::OneToMany => "Vec",
            };
            let target = generic_inner(&field.ty, "Related")
                .and_then(|inner| generic_inner(inner, wrapper))
                .cloned()
                .ok_or_else(|| {
                    syn::Error::new_spanned(
                        &field.ty,
                        format!("expected `Related<{wrapper}<T>>` for this association"),
                    )
                })?;
            Ok(FieldKind::Relation {
                kind,
                join_column,
                target,
            })
        }
        None => Ok(FieldKind::Column { primary_key }),
    }
}

/// Mark the `id` field as key when nothing is marked explicitly.
fn find_primary_key(name: &Ident, fields: &mut [EntityField]) -> syn::Result<Ident> {
    let marked: Vec<&EntityField> = fields
        .iter()
        .filter(|f| matches!(f.kind, FieldKind::Column { primary_key: true }))
        .collect();

    match marked.as_slice() {
        [key] => return Ok(key.ident.clone()),
        [] => {}
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "only one field may be marked `primary_key`",
            ))
        }
    }

    let id = fields
        .iter_mut()
        .find(|f| f.ident == "id" && matches!(f.kind, FieldKind::Column { .. }))
        .ok_or_else(|| {
            syn::Error::new_spanned(name, "no primary key: add `#[entity(primary_key)]` or an `id` field")
        })?;
    id.kind = FieldKind::Column { primary_key: true };
    Ok(id.ident.clone())
}

/// `Wrapper<T>` -> `T`
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}
