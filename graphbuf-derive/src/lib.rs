//! # Graphbuf Derive Macros
//!
//! This crate provides `#[derive(Schema)]`, which generates a companion
//! schema type (`FooSchema` for a struct `Foo`) implementing
//! `graphbuf::Schema<Foo>` from per-field attributes.
//!
//! Compatible with `syn 2.0`.
//!
//! ## Field attributes
//!
//! ```rust,ignore
//! #[derive(Debug, Default, Schema)]
//! struct Track {
//!     #[graphbuf(field = 1)]
//!     id: u64,
//!     #[graphbuf(field = 2, kind = "sint32")]
//!     offset: i32,
//!     #[graphbuf(field = 3, required)]
//!     title: Option<String>,
//!     #[graphbuf(field = 4)]
//!     sections: Vec<Section>,           // nested messages
//!     #[graphbuf(field = 5, graph)]
//!     next: Option<Rc<RefCell<Track>>>, // graph-shared reference
//! }
//! ```
//!
//! Field kinds are inferred from the Rust type (`i32` -> `int32`,
//! `String` -> `string`, `bytes::Bytes` -> `bytes`, `Rc<RefCell<T>>` ->
//! graph reference, any other path -> nested message with a `TSchema`
//! companion) and can be overridden with `kind = "..."` for the zigzag and
//! fixed-width representations. `Option<T>` marks presence, `Vec<T>` a
//! repeated field. Fields without a `#[graphbuf]` attribute are transient.
//! The message type must implement `Default`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitInt, LitStr, parse_macro_input};

/// Derives a `FooSchema` companion implementing `graphbuf::Schema<Foo>`.
#[proc_macro_derive(Schema, attributes(graphbuf))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

// --- Internal Data Structures ---

/// Smallest field number outside the protobuf range.
const FIELD_NUMBER_CEILING: u32 = 1 << 29;

#[derive(Clone, Copy, PartialEq)]
enum Scalar {
    Int32,
    UInt32,
    SInt32,
    Fixed32,
    SFixed32,
    Float,
    Int64,
    UInt64,
    SInt64,
    Fixed64,
    SFixed64,
    Double,
    Bool,
    Enum,
    Str,
    Bytes,
}

impl Scalar {
    fn from_kind(kind: &str) -> Option<Self> {
        Some(match kind {
            "int32" => Self::Int32,
            "uint32" => Self::UInt32,
            "sint32" => Self::SInt32,
            "fixed32" => Self::Fixed32,
            "sfixed32" => Self::SFixed32,
            "float" => Self::Float,
            "int64" => Self::Int64,
            "uint64" => Self::UInt64,
            "sint64" => Self::SInt64,
            "fixed64" => Self::Fixed64,
            "sfixed64" => Self::SFixed64,
            "double" => Self::Double,
            "bool" => Self::Bool,
            "enum" => Self::Enum,
            "string" => Self::Str,
            "bytes" => Self::Bytes,
            _ => return None,
        })
    }

    fn from_type_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "i32" => Self::Int32,
            "u32" => Self::UInt32,
            "i64" => Self::Int64,
            "u64" => Self::UInt64,
            "f32" => Self::Float,
            "f64" => Self::Double,
            "bool" => Self::Bool,
            "String" => Self::Str,
            "Bytes" => Self::Bytes,
            _ => return None,
        })
    }

    fn write_method(self) -> &'static str {
        match self {
            Self::Int32 => "write_int32",
            Self::UInt32 => "write_uint32",
            Self::SInt32 => "write_sint32",
            Self::Fixed32 => "write_fixed32",
            Self::SFixed32 => "write_sfixed32",
            Self::Float => "write_float",
            Self::Int64 => "write_int64",
            Self::UInt64 => "write_uint64",
            Self::SInt64 => "write_sint64",
            Self::Fixed64 => "write_fixed64",
            Self::SFixed64 => "write_sfixed64",
            Self::Double => "write_double",
            Self::Bool => "write_bool",
            Self::Enum => "write_enum",
            Self::Str => "write_string",
            Self::Bytes => "write_bytes",
        }
    }

    fn read_method(self) -> &'static str {
        match self {
            Self::Int32 => "read_int32",
            Self::UInt32 => "read_uint32",
            Self::SInt32 => "read_sint32",
            Self::Fixed32 => "read_fixed32",
            Self::SFixed32 => "read_sfixed32",
            Self::Float => "read_float",
            Self::Int64 => "read_int64",
            Self::UInt64 => "read_uint64",
            Self::SInt64 => "read_sint64",
            Self::Fixed64 => "read_fixed64",
            Self::SFixed64 => "read_sfixed64",
            Self::Double => "read_double",
            Self::Bool => "read_bool",
            Self::Enum => "read_enum",
            Self::Str => "read_string",
            Self::Bytes => "read_bytes",
        }
    }

    /// Written/read by reference rather than by value.
    fn by_ref(self) -> bool {
        matches!(self, Self::Str | Self::Bytes)
    }
}

enum Kind {
    Scalar(Scalar),
    /// Nested message; carries the element type and its schema path.
    Message(syn::Type, syn::Path),
    /// Graph-shared `Rc<RefCell<T>>`; carries the target schema path.
    Graph(syn::Path),
}

#[derive(Clone, Copy, PartialEq)]
enum Card {
    Singular,
    Optional,
    Repeated,
}

struct FieldSpec {
    ident: syn::Ident,
    number: u32,
    kind: Kind,
    card: Card,
    required: bool,
}

// --- Attribute parsing ---

struct FieldAttrs {
    number: Option<u32>,
    kind: Option<String>,
    graph: bool,
    message: bool,
    required: bool,
}

fn parse_attributes(field: &syn::Field) -> syn::Result<Option<FieldAttrs>> {
    let mut found = false;
    let mut attrs = FieldAttrs {
        number: None,
        kind: None,
        graph: false,
        message: false,
        required: false,
    };

    for attr in &field.attrs {
        if !attr.path().is_ident("graphbuf") {
            continue;
        }
        found = true;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("field") {
                let value = meta.value()?;
                let lit: LitInt = value.parse()?;
                attrs.number = Some(lit.base10_parse()?);
                return Ok(());
            }
            if meta.path.is_ident("kind") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                attrs.kind = Some(lit.value());
                return Ok(());
            }
            if meta.path.is_ident("graph") {
                attrs.graph = true;
                return Ok(());
            }
            if meta.path.is_ident("message") {
                attrs.message = true;
                return Ok(());
            }
            if meta.path.is_ident("required") {
                attrs.required = true;
                return Ok(());
            }
            Err(meta.error(
                "unknown graphbuf attribute key. Supported: field, kind, graph, message, required",
            ))
        })?;
    }

    Ok(found.then_some(attrs))
}

// --- Type classification ---

/// Returns the single generic argument of `Wrapper<T>` when the type is a
/// path ending in `wrapper`.
fn unwrap_generic<'t>(ty: &'t syn::Type, wrapper: &str) -> Option<&'t syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) if args.args.len() == 1 => Some(inner),
        _ => None,
    }
}

fn last_ident(ty: &syn::Type) -> Option<String> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    Some(type_path.path.segments.last()?.ident.to_string())
}

/// Builds the `FooSchema` companion path for a message type path.
fn schema_path(ty: &syn::Type) -> syn::Result<syn::Path> {
    let syn::Type::Path(type_path) = ty else {
        return Err(syn::Error::new_spanned(
            ty,
            "nested message fields must be plain type paths",
        ));
    };
    let mut path = type_path.path.clone();
    let Some(segment) = path.segments.last_mut() else {
        return Err(syn::Error::new_spanned(ty, "empty type path"));
    };
    segment.ident = format_ident!("{}Schema", segment.ident);
    segment.arguments = syn::PathArguments::None;
    Ok(path)
}

fn classify(field: &syn::Field, attrs: &FieldAttrs) -> syn::Result<(Kind, Card)> {
    let (card, element) = if let Some(inner) = unwrap_generic(&field.ty, "Option") {
        (Card::Optional, inner)
    } else if let Some(inner) = unwrap_generic(&field.ty, "Vec") {
        (Card::Repeated, inner)
    } else {
        (Card::Singular, &field.ty)
    };

    if attrs.graph || last_ident(element).as_deref() == Some("Rc") {
        let target = unwrap_generic(element, "Rc")
            .and_then(|cell| unwrap_generic(cell, "RefCell"))
            .ok_or_else(|| {
                syn::Error::new_spanned(
                    &field.ty,
                    "graph fields must be Rc<RefCell<T>> (optionally wrapped in Option or Vec)",
                )
            })?;
        return Ok((Kind::Graph(schema_path(target)?), card));
    }

    if let Some(kind) = &attrs.kind {
        let scalar = Scalar::from_kind(kind).ok_or_else(|| {
            syn::Error::new_spanned(&field.ty, format!("unknown field kind `{kind}`"))
        })?;
        return Ok((Kind::Scalar(scalar), card));
    }

    if !attrs.message {
        if let Some(scalar) = last_ident(element).as_deref().and_then(Scalar::from_type_ident) {
            return Ok((Kind::Scalar(scalar), card));
        }
        if last_ident(element).as_deref() == Some("u8") {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "use bytes::Bytes for byte payloads, not Vec<u8>",
            ));
        }
    }

    Ok((
        Kind::Message(element.clone(), schema_path(element)?),
        card,
    ))
}

// --- Generators ---

fn generate_write(spec: &FieldSpec) -> proc_macro2::TokenStream {
    let ident = &spec.ident;
    let number = spec.number;
    match (&spec.kind, spec.card) {
        (Kind::Scalar(scalar), Card::Singular) => {
            let write = format_ident!("{}", scalar.write_method());
            if scalar.by_ref() {
                quote! {
                    if !message.#ident.is_empty() {
                        output.#write(#number, &message.#ident, false)?;
                    }
                }
            } else {
                let present = match scalar {
                    Scalar::Bool => quote! { message.#ident },
                    Scalar::Float | Scalar::Double => quote! { message.#ident != 0.0 },
                    _ => quote! { message.#ident != 0 },
                };
                quote! {
                    if #present {
                        output.#write(#number, message.#ident, false)?;
                    }
                }
            }
        }
        (Kind::Scalar(scalar), Card::Optional) => {
            let write = format_ident!("{}", scalar.write_method());
            let value = if scalar.by_ref() {
                quote! { value }
            } else {
                quote! { *value }
            };
            quote! {
                if let ::core::option::Option::Some(value) = &message.#ident {
                    output.#write(#number, #value, false)?;
                }
            }
        }
        (Kind::Scalar(scalar), Card::Repeated) => {
            let write = format_ident!("{}", scalar.write_method());
            let value = if scalar.by_ref() {
                quote! { value }
            } else {
                quote! { *value }
            };
            quote! {
                for value in &message.#ident {
                    output.#write(#number, #value, true)?;
                }
            }
        }
        (Kind::Message(_, schema), Card::Singular) => quote! {
            output.write_message(#number, &message.#ident, &#schema, false)?;
        },
        (Kind::Message(_, schema), Card::Optional) => quote! {
            if let ::core::option::Option::Some(value) = &message.#ident {
                output.write_message(#number, value, &#schema, false)?;
            }
        },
        (Kind::Message(_, schema), Card::Repeated) => quote! {
            for value in &message.#ident {
                output.write_message(#number, value, &#schema, true)?;
            }
        },
        (Kind::Graph(schema), Card::Singular) => quote! {
            output.write_graph_message(#number, &message.#ident, &#schema, false)?;
        },
        (Kind::Graph(schema), Card::Optional) => quote! {
            if let ::core::option::Option::Some(value) = &message.#ident {
                output.write_graph_message(#number, value, &#schema, false)?;
            }
        },
        (Kind::Graph(schema), Card::Repeated) => quote! {
            for value in &message.#ident {
                output.write_graph_message(#number, value, &#schema, true)?;
            }
        },
    }
}

fn generate_merge_arm(spec: &FieldSpec) -> proc_macro2::TokenStream {
    let ident = &spec.ident;
    let number = spec.number;
    let body = match (&spec.kind, spec.card) {
        (Kind::Scalar(scalar), Card::Singular) => {
            let read = format_ident!("{}", scalar.read_method());
            quote! { message.#ident = input.#read()?; }
        }
        (Kind::Scalar(scalar), Card::Optional) => {
            let read = format_ident!("{}", scalar.read_method());
            quote! { message.#ident = ::core::option::Option::Some(input.#read()?); }
        }
        (Kind::Scalar(scalar), Card::Repeated) => {
            let read = format_ident!("{}", scalar.read_method());
            quote! { message.#ident.push(input.#read()?); }
        }
        (Kind::Message(_, schema), Card::Singular) => quote! {
            input.merge_message(&mut message.#ident, &#schema)?;
        },
        (Kind::Message(_, schema), Card::Optional) => quote! {
            let value = message.#ident.get_or_insert_with(::core::default::Default::default);
            input.merge_message(value, &#schema)?;
        },
        (Kind::Message(element, schema), Card::Repeated) => quote! {
            let mut value: #element = ::core::default::Default::default();
            input.merge_message(&mut value, &#schema)?;
            message.#ident.push(value);
        },
        (Kind::Graph(schema), Card::Singular) => quote! {
            message.#ident = input.merge_graph_message(tag, &#schema)?;
        },
        (Kind::Graph(schema), Card::Optional) => quote! {
            message.#ident =
                ::core::option::Option::Some(input.merge_graph_message(tag, &#schema)?);
        },
        (Kind::Graph(schema), Card::Repeated) => quote! {
            let value = input.merge_graph_message(tag, &#schema)?;
            message.#ident.push(value);
        },
    };
    quote! { #number => { #body } }
}

// --- Entry ---

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Schema cannot be derived for generic types",
        ));
    }

    let fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(named) => named.named,
            _ => {
                return Err(syn::Error::new(
                    name.span(),
                    "Schema only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                name.span(),
                "Schema only supports structs with named fields",
            ));
        }
    };

    let mut specs: Vec<FieldSpec> = Vec::new();
    for field in &fields {
        let Some(attrs) = parse_attributes(field)? else {
            continue; // transient field
        };
        let Some(number) = attrs.number else {
            return Err(syn::Error::new_spanned(
                field,
                "missing field number: #[graphbuf(field = N)]",
            ));
        };
        if number == 0 || number >= FIELD_NUMBER_CEILING {
            return Err(syn::Error::new_spanned(
                field,
                "field numbers must be in 1..=536870911",
            ));
        }
        if specs.iter().any(|s| s.number == number) {
            return Err(syn::Error::new_spanned(
                field,
                format!("duplicate field number {number}"),
            ));
        }
        let (kind, card) = classify(field, &attrs)?;
        if attrs.required && card != Card::Optional {
            return Err(syn::Error::new_spanned(
                field,
                "`required` only applies to Option fields",
            ));
        }
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        specs.push(FieldSpec {
            ident,
            number,
            kind,
            card,
            required: attrs.required,
        });
    }

    // fields are visited in ascending field-number order
    specs.sort_by_key(|s| s.number);

    let write_stmts: Vec<_> = specs.iter().map(generate_write).collect();
    let merge_arms: Vec<_> = specs.iter().map(generate_merge_arm).collect();
    let required_checks: Vec<_> = specs
        .iter()
        .filter(|s| s.required)
        .map(|s| {
            let ident = &s.ident;
            quote! {
                if message.#ident.is_none() {
                    return false;
                }
            }
        })
        .collect();

    let schema_name = format_ident!("{}Schema", name);
    let name_literal = name.to_string();
    let vis = input.vis;
    let schema_doc = format!("Generated schema for [`{name_literal}`].");
    let unused_guard = if specs.is_empty() {
        quote! { let _ = (&output, &message); }
    } else {
        quote! {}
    };

    Ok(quote! {
        #[doc = #schema_doc]
        #[derive(Clone, Copy, Debug, Default)]
        #vis struct #schema_name;

        #[automatically_derived]
        impl ::graphbuf::schema::Schema<#name> for #schema_name {
            fn message_name(&self) -> &'static str {
                #name_literal
            }

            fn new_message(&self) -> #name {
                <#name as ::core::default::Default>::default()
            }

            fn is_initialized(&self, message: &#name) -> bool {
                let _ = &message;
                #(#required_checks)*
                true
            }

            fn write_to<O: ::graphbuf::output::Output>(
                &self,
                output: &mut O,
                message: &#name,
            ) -> ::graphbuf::error::Result<()> {
                #unused_guard
                #(#write_stmts)*
                ::core::result::Result::Ok(())
            }

            fn merge_from<I: ::graphbuf::input::Input>(
                &self,
                input: &mut I,
                message: &mut #name,
            ) -> ::graphbuf::error::Result<()> {
                loop {
                    let tag = input.read_tag()?;
                    if tag == 0 {
                        return ::core::result::Result::Ok(());
                    }
                    match tag >> 3 {
                        #(#merge_arms)*
                        _ => input.skip_field(tag)?,
                    }
                }
            }
        }
    })
}
