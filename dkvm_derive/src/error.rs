//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations from
//! `#[error("...")]` messages, without pulling `thiserror` into the dependency tree.
//!
//! # Usage
//!
//! ```ignore
//! use dkvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum AsmError {
//!     #[error("label {0} redefined")]
//!     Redefined(String),
//!
//!     #[error("byte {offset}: bad opcode {opcode:#04x}")]
//!     BadOpcode { offset: usize, opcode: u8 },
//!
//!     #[error("no input files")]
//!     NoInput,
//! }
//! ```
//!
//! Only the fields a message mentions are bound, so a variant may carry data that its
//! message does not print.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let message = message_from_attrs(&variant.attrs, &variant.ident)?;
                    let ident = &variant.ident;
                    Ok(render(quote!(Self::#ident), &variant.fields, &message))
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data) => {
            let message = message_from_attrs(&input.attrs, &input.ident)?;
            let arm = render(quote!(Self), &data.fields, &message);
            quote! {
                match self {
                    #arm
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "`Error` cannot be derived for unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds one `pattern => write!(...)` match arm.
fn render(path: TokenStream2, fields: &Fields, message: &LitStr) -> TokenStream2 {
    let text = message.value();
    let referenced = placeholders(&text);

    match fields {
        Fields::Unit => quote! {
            #path => f.write_fmt(format_args!(#message)),
        },
        Fields::Named(named) => {
            let bound: Vec<&Ident> = named
                .named
                .iter()
                .filter_map(|field| field.ident.as_ref())
                .filter(|ident| referenced.iter().any(|r| *ident == r))
                .collect();
            quote! {
                #path { #(#bound,)* .. } => write!(f, #message, #(#bound = #bound),*),
            }
        }
        Fields::Unnamed(unnamed) => {
            let mut patterns = Vec::with_capacity(unnamed.unnamed.len());
            let mut bound = Vec::new();
            for index in 0..unnamed.unnamed.len() {
                if referenced.iter().any(|r| *r == index.to_string()) {
                    let ident = format_ident!("f{}", index);
                    patterns.push(ident.to_token_stream());
                    bound.push(ident);
                } else {
                    patterns.push(quote!(_));
                }
            }
            let rewritten = LitStr::new(&positional_to_named(&text), Span::call_site());
            quote! {
                #path(#(#patterns),*) => write!(f, #rewritten, #(#bound = #bound),*),
            }
        }
    }
}

/// Extracts the `#[error("...")]` message.
fn message_from_attrs<T: ToTokens>(attrs: &[Attribute], target: &T) -> syn::Result<LitStr> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(
                target,
                "missing #[error(\"...\")] attribute; every error must declare its message",
            )
        })?;

    attr.parse_args::<LitStr>().map_err(|_| {
        syn::Error::new_spanned(
            attr,
            "expected a string literal, e.g. #[error(\"invalid opcode {opcode}\")]",
        )
    })
}

/// Returns the argument names used by a format string (`{name}`, `{0:?}`, ...).
fn placeholders(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == '}' || c == ':' {
                        break;
                    }
                    name.push(c);
                }
                let name = name.trim().to_string();
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            _ => {}
        }
    }

    names
}

/// Rewrites positional placeholders `{0}` / `{1:?}` into `{f0}` / `{f1:?}`.
fn positional_to_named(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            out.push('{');
            chars.next();
            continue;
        }
        if chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            out.push('f');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_collects_named_and_positional() {
        assert_eq!(
            placeholders("byte {offset}: {0} {opcode:#04x} {offset}"),
            vec!["offset", "0", "opcode"]
        );
    }

    #[test]
    fn placeholders_skips_escaped_braces() {
        assert!(placeholders("literal {{braces}}").is_empty());
    }

    #[test]
    fn positional_rewrite() {
        assert_eq!(positional_to_named("a {0} b {1:?}"), "a {f0} b {f1:?}");
        assert_eq!(positional_to_named("{{0}} {name}"), "{{0}} {name}");
    }
}
