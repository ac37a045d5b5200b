//! Derive macros for the dkvm crate.
//!
//! Provides `#[derive(Error)]`, the `Display` + `std::error::Error` boilerplate used by
//! every error type of the virtual machine toolchain.

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `Error` from per-variant `#[error("...")]` messages.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
