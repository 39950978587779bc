mod model;

use proc_macro::TokenStream;

/// Derives `model_graph::Model` for a struct with named fields.
///
/// The struct needs exactly one `ModelCore` field. Fields typed `SingleRef<_>`
/// or `RefCollection<_>` become the model's reference fields, in declaration
/// order. A skipped field is not followed by traversal or `save_from`, but it
/// is still linked on load and released on delete.
///
/// # Attributes
///
/// ```ignore
/// #[derive(Model, Serialize, Deserialize)]
/// #[model(tag = "Mech")]          // persisted type tag, defaults to the struct name
/// struct MechModel {
///     core: ModelCore,
///     pilot: SingleRef<Pilot>,
///     #[model(skip)]              // not followed when traversing
///     last_target: SingleRef<Mech>,
/// }
/// ```
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model(input)
}
