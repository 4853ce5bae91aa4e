extern crate proc_macro;

use itertools::izip;
use proc_macro::TokenStream;
use quote::quote;
use std::collections::HashMap;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, LitInt, Type};

/// Field attributes parsed from `#[record(...)]` annotations
///
/// # Fields
///
/// * `rename` - Wire key to use instead of the field name
/// * `max_len` - Upper bound in bytes for textual members
/// * `skip` - Leave the field out of the descriptor list entirely
#[derive(Clone, Default)]
struct FieldAttributes {
    rename: Option<String>,
    max_len: Option<LitInt>,
    skip: bool,
}

/// Extract and parse `#[record(...)]` attribute values from field attributes
///
/// # Supported Attributes
///
/// * `#[record(rename = "Name")]` - Wire key
/// * `#[record(max_len = 32)]` - Truncate textual values to 32 bytes on encode
/// * `#[record(skip)]` - Not encoded, not decoded
///
/// Multiple attributes can be combined: `#[record(rename = "Name", max_len = 32)]`
fn get_field_attributes(attrs: &[Attribute], field_name: &str) -> FieldAttributes {
    let mut result = FieldAttributes::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        let parsed = attr.parse_args_with(|input: syn::parse::ParseStream| {
            let mut parsed = FieldAttributes::default();

            while !input.is_empty() {
                let ident = input.parse::<syn::Ident>()?;

                if ident == "rename" {
                    input.parse::<syn::Token![=]>()?;
                    let lit_str = input.parse::<syn::LitStr>()?;
                    if lit_str.value().is_empty() {
                        return Err(syn::Error::new(lit_str.span(), "Field name must not be empty"));
                    }
                    parsed.rename = Some(lit_str.value());
                } else if ident == "max_len" {
                    input.parse::<syn::Token![=]>()?;
                    let lit = input.parse::<LitInt>()?;
                    lit.base10_parse::<usize>()?;
                    parsed.max_len = Some(lit);
                } else if ident == "skip" {
                    parsed.skip = true;
                } else {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("Unknown attribute: {}", ident),
                    ));
                }

                // Consume comma if present, otherwise end
                if input.peek(syn::Token![,]) {
                    input.parse::<syn::Token![,]>()?;
                }
            }

            Ok(parsed)
        });

        match parsed {
            Ok(parsed) => {
                if parsed.rename.is_some() {
                    result.rename = parsed.rename;
                }
                if parsed.max_len.is_some() {
                    result.max_len = parsed.max_len;
                }
                result.skip = result.skip || parsed.skip;
            }
            Err(err) => panic!(
                "#[record(...)] attribute for field '{}' is not in the correct format: {}",
                field_name, err
            ),
        }
    }

    result
}

/// Derive macro for implementing `Record`, `Encoder` and `Decoder`
///
/// The struct is written as a map keyed by field name, in declaration order.
/// Decoding starts from `Default::default()`, so the struct must implement `Default`.
///
/// # Supported Attributes
///
/// * `#[record(rename = "Name")]` - Use an alternative wire key
/// * `#[record(max_len = N)]` - Truncate a textual field to `N` bytes on encode
/// * `#[record(skip)]` - Exclude the field; it keeps its default on decode
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Record, Default)]
/// struct Channel {
///     #[record(rename = "Name", max_len = 16)]
///     name: String,
///     #[record(skip)]
///     cached: u64,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("Record can only be derived for structs with named fields: '{}'", name),
        },
        _ => panic!("Record can only be derived for structs: '{}'", name),
    };

    let mut used_names: HashMap<String, String> = HashMap::new();
    let mut descriptors = Vec::new();
    for f in fields {
        let Some(field_ident) = f.ident.as_ref() else {
            continue;
        };
        let field_name_str = field_ident.to_string();
        let field_attrs = get_field_attributes(&f.attrs, &field_name_str);

        if field_attrs.skip {
            continue;
        }

        let wire_name = field_attrs
            .rename
            .clone()
            .unwrap_or_else(|| field_name_str.clone());
        if let Some(previous) = used_names.insert(wire_name.clone(), field_name_str.clone()) {
            panic!("Field name '{}' is duplicated for struct '{}' (fields '{}' and '{}'). Please choose a different name using #[record(rename = ...)].", wire_name, name, previous, field_name_str);
        }

        let ty = &f.ty;
        let max_len = field_attrs
            .max_len
            .as_ref()
            .map(|lit| quote! { .with_max_len(#lit) });
        descriptors.push(quote! {
            &recpack::Field::<Self, #ty>::new(
                #wire_name,
                |record| &record.#field_ident,
                |record| &mut record.#field_ident,
            )#max_len
        });
    }

    let expanded = quote! {
        impl #impl_generics recpack::Record for #name #ty_generics #where_clause {
            const FIELDS: &'static [&'static dyn recpack::FieldCodec<Self>] = &[
                #(#descriptors),*
            ];
        }

        impl #impl_generics recpack::Encoder for #name #ty_generics #where_clause {
            const WIRE_TAG: recpack::WireTag = recpack::WireTag::CustomRecord;

            fn encode(&self, writer: &mut recpack::Writer) -> recpack::Result<()> {
                recpack::encode_record(self, writer)
            }
        }

        impl #impl_generics recpack::Decoder for #name #ty_generics #where_clause {
            fn decode(reader: &mut recpack::Reader) -> recpack::Result<Self> {
                let mut record = <Self as ::std::default::Default>::default();
                recpack::decode_record_into(&mut record, reader)?;
                Ok(record)
            }

            fn decode_into(&mut self, reader: &mut recpack::Reader) -> recpack::Result<()> {
                recpack::decode_record_into(self, reader)
            }

            fn accepts(tag: recpack::WireTag) -> bool {
                tag == recpack::WireTag::Map
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for tagged unions
///
/// Applies to enums whose variants each wrap exactly one value. The active variant is
/// written as its own wire value with no wrapper. On decode the next wire type is
/// peeked once and the first variant, in declaration order, whose type accepts it is
/// decoded. Variants sharing a wire type are therefore resolved by declaration order.
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Union, Debug, PartialEq)]
/// enum Reading {
///     Flag(bool),
///     Value(f64),
/// }
/// ```
#[proc_macro_derive(Union)]
pub fn derive_union(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let variants = match &input.data {
        Data::Enum(e) => &e.variants,
        _ => panic!("Union can only be derived for enums: '{}'", name),
    };
    if variants.is_empty() {
        panic!("Union '{}' must have at least one variant", name);
    }

    let mut variant_idents: Vec<&Ident> = Vec::new();
    let mut variant_types: Vec<&Type> = Vec::new();
    for v in variants {
        match &v.fields {
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                variant_idents.push(&v.ident);
                variant_types.push(&fields.unnamed[0].ty);
            }
            _ => panic!(
                "Variant '{}::{}' must wrap exactly one value, e.g. {}(T)",
                name, v.ident, v.ident
            ),
        }
    }

    let mut encode_arms = Vec::new();
    let mut truncated_arms = Vec::new();
    let mut decode_attempts = Vec::new();
    for (variant_ident, ty) in izip!(&variant_idents, &variant_types) {
        encode_arms.push(quote! {
            #name::#variant_ident(value) => recpack::Encoder::encode(value, writer),
        });
        truncated_arms.push(quote! {
            #name::#variant_ident(value) => recpack::Encoder::encode_truncated(value, writer, max_len),
        });
        decode_attempts.push(quote! {
            if <#ty as recpack::Decoder>::accepts(tag) {
                return Ok(#name::#variant_ident(<#ty as recpack::Decoder>::decode(reader)?));
            }
        });
    }

    let expanded = quote! {
        impl #impl_generics recpack::Encoder for #name #ty_generics #where_clause {
            const WIRE_TAG: recpack::WireTag = recpack::WireTag::Missing;

            fn encode(&self, writer: &mut recpack::Writer) -> recpack::Result<()> {
                match self {
                    #(#encode_arms)*
                }
            }

            fn encode_truncated(&self, writer: &mut recpack::Writer, max_len: usize) -> recpack::Result<()> {
                match self {
                    #(#truncated_arms)*
                }
            }
        }

        impl #impl_generics recpack::Decoder for #name #ty_generics #where_clause {
            fn decode(reader: &mut recpack::Reader) -> recpack::Result<Self> {
                let tag = reader.peek_tag()?;
                #(#decode_attempts)*
                Err(recpack::unresolvable_union(#name_str, tag))
            }

            fn accepts(tag: recpack::WireTag) -> bool {
                #(<#variant_types as recpack::Decoder>::accepts(tag))||*
            }
        }
    };

    TokenStream::from(expanded)
}
