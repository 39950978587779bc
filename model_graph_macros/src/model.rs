use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitStr, Type};

const REFERENCE_TYPES: [&str; 2] = ["SingleRef", "RefCollection"];

pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let tag = extract_tag(&input);
    let fields = named_fields(&input);

    let core_field = fields
        .iter()
        .find(|field| last_segment(&field.ty).is_some_and(|seg| seg == "ModelCore"))
        .and_then(|field| field.ident.clone())
        .unwrap_or_else(|| panic!("Model derive: `{}` has no `ModelCore` field", name));

    let reference_typed: Vec<&Field> = fields
        .iter()
        .copied()
        .filter(|field| {
            last_segment(&field.ty).is_some_and(|seg| REFERENCE_TYPES.contains(&seg.as_str()))
        })
        .collect();

    // Skipped fields are still linked on load and released on delete.
    let owned_fields: Vec<_> = reference_typed
        .iter()
        .filter_map(|field| field.ident.as_ref())
        .collect();
    let reference_fields: Vec<_> = reference_typed
        .iter()
        .filter(|field| !is_skipped(field))
        .filter_map(|field| field.ident.as_ref())
        .collect();

    let expanded = quote! {
        impl #impl_generics model_graph::Model for #name #ty_generics #where_clause {
            const TYPE_TAG: &'static str = #tag;

            fn core(&self) -> &model_graph::ModelCore {
                &self.#core_field
            }

            fn references(&self) -> ::std::vec::Vec<&dyn model_graph::Reference> {
                ::std::vec![#(&self.#reference_fields as &dyn model_graph::Reference),*]
            }

            fn owned_references(&self) -> ::std::vec::Vec<&dyn model_graph::Reference> {
                ::std::vec![#(&self.#owned_fields as &dyn model_graph::Reference),*]
            }
        }
    };

    TokenStream::from(expanded)
}

fn named_fields(input: &DeriveInput) -> Vec<&Field> {
    if let Data::Struct(data_struct) = &input.data {
        if let Fields::Named(fields) = &data_struct.fields {
            return fields.named.iter().collect();
        }
    }

    panic!("Model derive: only structs with named fields are supported");
}

fn extract_tag(input: &DeriveInput) -> String {
    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        let mut tag = None;
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let value: LitStr = meta.value()?.parse()?;
                tag = Some(value.value());
            }
            Ok(())
        });

        if let Some(t) = tag {
            return t;
        }
    }

    input.ident.to_string()
}

fn is_skipped(field: &Field) -> bool {
    let mut skip = false;
    for attr in &field.attrs {
        if attr.path().is_ident("model") {
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    skip = true;
                }
                Ok(())
            });
        }
    }
    skip
}

/// `SingleRef` for `model_graph::SingleRef<Pilot>`.
fn last_segment(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    }
}
