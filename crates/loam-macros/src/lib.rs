extern crate proc_macro;

use proc_macro::TokenStream;

/// Derive the record contract from a struct declaration.
///
/// Field annotations ride in a `#[loam("...")]` attribute carrying the
/// semicolon-separated `key[=value]` grammar; struct-level attributes name
/// the table and the implemented hooks:
///
/// ```ignore
/// #[derive(Record, Default)]
/// #[loam(table = "people", hooks(before_create))]
/// struct User {
///     id: u64,
///     #[loam("size=64;not null")]
///     name: String,
/// }
/// ```
#[proc_macro_derive(Record, attributes(loam))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    match loam_codegen::generate(input.into()) {
        Ok(output) => output.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
