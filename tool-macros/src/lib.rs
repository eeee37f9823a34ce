//! Procedural macros for toolgate tool definitions.
//!
//! `#[tool]` leaves the annotated function untouched and emits a sibling
//! `<name>_tool()` constructor returning a `tool_registry::LocalTool`. The
//! constructor reflects the parameter names, their declared types and the
//! rustdoc into a `CallableSignature`, so schema derivation happens in one
//! place at runtime while registration stays an explicit call.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{
    Attribute, Expr, ExprLit, FnArg, ItemFn, Lit, LitStr, Meta, Pat, ReturnType, Type,
    parse_macro_input,
};

const PERMISSIONS: [(&str, &str); 4] = [
    ("safe", "Safe"),
    ("elevated", "Elevated"),
    ("system", "System"),
    ("dangerous", "Dangerous"),
];

const CATEGORIES: [(&str, &str); 7] = [
    ("file_system", "FileSystem"),
    ("information", "Information"),
    ("productivity", "Productivity"),
    ("communication", "Communication"),
    ("development", "Development"),
    ("system", "System"),
    ("general", "General"),
];

#[derive(Default)]
struct ToolArgs {
    name: Option<LitStr>,
    description: Option<LitStr>,
    permission: Option<LitStr>,
    category: Option<LitStr>,
    tags: Option<LitStr>,
}

impl ToolArgs {
    fn parse(&mut self, meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
        let slot = if meta.path.is_ident("name") {
            &mut self.name
        } else if meta.path.is_ident("description") {
            &mut self.description
        } else if meta.path.is_ident("permission") {
            &mut self.permission
        } else if meta.path.is_ident("category") {
            &mut self.category
        } else if meta.path.is_ident("tags") {
            &mut self.tags
        } else {
            return Err(meta.error(
                "unsupported tool property; expected name, description, permission, category or tags",
            ));
        };
        *slot = Some(meta.value()?.parse()?);
        Ok(())
    }
}

struct Parameter {
    ident: syn::Ident,
    ty: Type,
    default: Option<Expr>,
}

/// Marks a function as a tool and generates its registry binding.
///
/// ```ignore
/// /// Adds two integers.
/// ///
/// /// # Arguments
/// /// * `a` - left operand
/// /// * `b` - right operand
/// #[tool(permission = "safe", category = "general", tags = "math, numbers")]
/// fn add(a: i64, #[tool(default = 0)] b: i64) -> i64 {
///     a + b
/// }
///
/// add_tool()?.register(&registry)?;
/// ```
///
/// Synchronous functions run on the blocking pool. A return type whose last
/// path segment ends in `Result`, such as `io::Result` or a local alias, has
/// its error rendered through `Display`.
#[proc_macro_attribute]
pub fn tool(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = ToolArgs::default();
    let parser = syn::meta::parser(|meta| args.parse(&meta));
    parse_macro_input!(attr with parser);
    let mut function = parse_macro_input!(item as ItemFn);

    match expand(&args, &mut function) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(args: &ToolArgs, function: &mut ItemFn) -> syn::Result<TokenStream2> {
    let sig = &function.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(
            sig.generics.span(),
            "tool functions cannot be generic",
        ));
    }
    if let Some(name) = &args.name {
        let value = name.value();
        if value.trim().is_empty() || value.chars().any(char::is_whitespace) {
            return Err(syn::Error::new(
                name.span(),
                "tool name must be non-empty and contain no whitespace",
            ));
        }
    }

    let parameters = collect_parameters(function)?;
    let sig = &function.sig;
    let fn_ident = &sig.ident;
    let fn_name = fn_ident.to_string();
    let binding_ident = format_ident!("{}_tool", fn_ident);
    let vis = &function.vis;

    let signature_params = parameters.iter().map(|param| {
        let name = param.ident.to_string();
        let ty = &param.ty;
        let declared = quote!(#ty).to_string();
        let default = param.default.as_ref().map(|expr| {
            quote!(.with_default(::tool_registry::__private::serde_json::json!(#expr)))
        });
        quote! {
            .param(::tool_registry::FormalParameter::new(#name).typed(#declared) #default)
        }
    });

    let documentation = doc_string(&function.attrs).map(|doc| quote!(.documented(#doc)));

    let options = option_tokens(args)?;

    let arguments = format_ident!("__tool_arguments");
    let extract = parameters.iter().map(|param| {
        let ident = &param.ident;
        let name = ident.to_string();
        let ty = &param.ty;
        match &param.default {
            Some(expr) => quote! {
                let #ident: #ty = ::tool_registry::take_argument_or(
                    &mut #arguments,
                    #name,
                    || ::core::convert::Into::into(#expr),
                )?;
            },
            None => quote! {
                let #ident: #ty = ::tool_registry::take_argument(&mut #arguments, #name)?;
            },
        }
    });
    let idents: Vec<_> = parameters.iter().map(|param| &param.ident).collect();
    let closure_arg = if parameters.is_empty() {
        quote!(_: ::tool_registry::__private::tool_primitives::ToolArguments)
    } else {
        quote!(mut #arguments: ::tool_registry::__private::tool_primitives::ToolArguments)
    };

    let is_async = sig.asyncness.is_some();
    let call = if is_async {
        quote!(#fn_ident(#(#idents),*).await)
    } else {
        quote!(#fn_ident(#(#idents),*))
    };
    let unwrap_result = returns_result(&sig.output).then(|| {
        quote! {
            let output = output
                .map_err(|err| ::tool_registry::HandlerError::failed(err.to_string()))?;
        }
    });
    let body = quote! {
        #(#extract)*
        let output = #call;
        #unwrap_result
        ::tool_registry::to_output(output)
    };

    let handler = if is_async {
        quote! {
            ::tool_registry::LocalHandler::new(
                |#closure_arg, _: ::tool_registry::__private::tool_primitives::ExecutionContext| async move {
                    #body
                },
            )
        }
    } else {
        quote! {
            ::tool_registry::LocalHandler::blocking(
                |#closure_arg, _: ::tool_registry::__private::tool_primitives::ExecutionContext| {
                    #body
                },
            )
        }
    };

    let binding_doc = format!("Registry binding for [`{fn_name}`].");

    Ok(quote! {
        #function

        #[doc = #binding_doc]
        ///
        /// # Errors
        ///
        /// Returns an error if the derived descriptor is invalid.
        #vis fn #binding_ident() -> ::tool_registry::__private::tool_primitives::Result<::tool_registry::LocalTool> {
            let signature = ::tool_registry::CallableSignature::new(#fn_name)
                #(#signature_params)*
                #documentation;
            let options = ::tool_registry::ToolOptions::default() #options;
            let handler = #handler;
            ::tool_registry::LocalTool::from_signature(&signature, options, handler)
        }
    })
}

fn collect_parameters(function: &mut ItemFn) -> syn::Result<Vec<Parameter>> {
    let mut parameters = Vec::new();
    for input in &mut function.sig.inputs {
        let typed = match input {
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new(
                    receiver.span(),
                    "tool functions cannot take self",
                ));
            }
            FnArg::Typed(typed) => typed,
        };

        let Pat::Ident(pat) = typed.pat.as_ref() else {
            return Err(syn::Error::new(
                typed.pat.span(),
                "tool parameters must be plain identifiers",
            ));
        };
        if matches!(typed.ty.as_ref(), Type::Reference(_) | Type::ImplTrait(_)) {
            return Err(syn::Error::new(
                typed.ty.span(),
                "tool parameters must be owned, concrete types",
            ));
        }

        let mut default = None;
        let mut kept = Vec::with_capacity(typed.attrs.len());
        for attr in typed.attrs.drain(..) {
            if attr.path().is_ident("tool") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("default") {
                        default = Some(meta.value()?.parse::<Expr>()?);
                        Ok(())
                    } else {
                        Err(meta.error("unsupported parameter property; expected default"))
                    }
                })?;
            } else {
                kept.push(attr);
            }
        }
        typed.attrs = kept;

        parameters.push(Parameter {
            ident: pat.ident.clone(),
            ty: typed.ty.as_ref().clone(),
            default,
        });
    }
    Ok(parameters)
}

fn option_tokens(args: &ToolArgs) -> syn::Result<TokenStream2> {
    let mut tokens = TokenStream2::new();
    if let Some(name) = &args.name {
        tokens.extend(quote!(.named(#name)));
    }
    if let Some(description) = &args.description {
        tokens.extend(quote!(.described(#description)));
    }
    if let Some(permission) = &args.permission {
        let variant = lookup(permission, &PERMISSIONS, "permission level")?;
        tokens.extend(quote!(
            .permission(::tool_registry::__private::tool_primitives::PermissionLevel::#variant)
        ));
    }
    if let Some(category) = &args.category {
        let variant = lookup(category, &CATEGORIES, "category")?;
        tokens.extend(quote!(
            .category(::tool_registry::__private::tool_primitives::ToolCategory::#variant)
        ));
    }
    if let Some(tags) = &args.tags {
        for tag in tags.value().split(',').map(str::trim).filter(|t| !t.is_empty()) {
            tokens.extend(quote!(.tag(#tag)));
        }
    }
    Ok(tokens)
}

fn lookup(literal: &LitStr, table: &[(&str, &str)], kind: &str) -> syn::Result<syn::Ident> {
    let value = literal.value().to_ascii_lowercase();
    table
        .iter()
        .find(|(label, _)| *label == value)
        .map(|(_, variant)| format_ident!("{}", variant))
        .ok_or_else(|| {
            let expected: Vec<&str> = table.iter().map(|(label, _)| *label).collect();
            syn::Error::new(
                literal.span(),
                format!("unknown {kind}; expected one of {}", expected.join(", ")),
            )
        })
}

fn doc_string(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(pair) => match &pair.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(text),
                    ..
                }) => Some(text.value()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn returns_result(output: &ReturnType) -> bool {
    let ReturnType::Type(_, ty) = output else {
        return false;
    };
    match ty.as_ref() {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident.to_string().ends_with("Result")),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proc_macro2::Span;
    use syn::parse_quote;

    fn lit(value: &str) -> Option<LitStr> {
        Some(LitStr::new(value, Span::call_site()))
    }

    fn compact(tokens: &TokenStream2) -> String {
        tokens.to_string().split_whitespace().collect()
    }

    fn rejection(args: &ToolArgs, mut function: ItemFn) -> String {
        match expand(args, &mut function) {
            Ok(tokens) => panic!("expected a compile error, got {tokens}"),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn parameter_defaults_are_lifted_out_of_the_function() {
        let mut function: ItemFn = parse_quote! {
            /// Reads a file.
            fn read(path: String, #[tool(default = 1024_u64)] #[allow(unused)] limit: u64) -> String {
                path
            }
        };
        let tokens = compact(&expand(&ToolArgs::default(), &mut function).unwrap());

        let kept: Vec<Vec<String>> = function
            .sig
            .inputs
            .iter()
            .map(|input| match input {
                FnArg::Typed(typed) => typed
                    .attrs
                    .iter()
                    .map(|attr| quote!(#attr).to_string().split_whitespace().collect())
                    .collect(),
                FnArg::Receiver(_) => unreachable!(),
            })
            .collect();
        assert_eq!(kept, [vec![], vec!["#[allow(unused)]".to_owned()]]);
        assert!(tokens.contains(".with_default("));
        assert!(tokens.contains("1024_u64"));
        assert!(tokens.contains("take_argument_or"));
        assert!(tokens.contains("fnread_tool()"));
        assert!(tokens.contains("LocalHandler::blocking"));
    }

    #[test]
    fn async_functions_get_an_async_handler() {
        let mut function: ItemFn = parse_quote! {
            async fn fetch(url: String) -> String { url }
        };
        let tokens = compact(&expand(&ToolArgs::default(), &mut function).unwrap());
        assert!(tokens.contains("LocalHandler::new"));
        assert!(tokens.contains("fetch(url).await"));
    }

    #[test]
    fn result_detection_follows_the_last_path_segment() {
        let cases: [(ReturnType, bool); 6] = [
            (parse_quote!(-> Result<i64, String>), true),
            (parse_quote!(-> std::io::Result<()>), true),
            (parse_quote!(-> FileResult<u8>), true),
            (parse_quote!(-> Option<Result<u8, String>>), false),
            (parse_quote!(-> i64), false),
            (ReturnType::Default, false),
        ];
        for (output, expected) in cases {
            assert_eq!(returns_result(&output), expected, "{}", quote!(#output));
        }
    }

    #[test]
    fn unsupported_signatures_are_compile_errors() {
        let args = ToolArgs::default();
        assert_eq!(
            rejection(&args, parse_quote!(fn pick<T>(value: T) -> i64 { 0 })),
            "tool functions cannot be generic"
        );
        assert_eq!(
            rejection(&args, parse_quote!(fn method(&self) -> i64 { 0 })),
            "tool functions cannot take self"
        );
        assert_eq!(
            rejection(&args, parse_quote!(fn borrow(text: &str) -> usize { text.len() })),
            "tool parameters must be owned, concrete types"
        );
        assert_eq!(
            rejection(&args, parse_quote!(fn opaque(items: impl Iterator<Item = u8>) -> u8 { 0 })),
            "tool parameters must be owned, concrete types"
        );
        assert_eq!(
            rejection(&args, parse_quote!(fn pair((a, b): (i64, i64)) -> i64 { a + b })),
            "tool parameters must be plain identifiers"
        );
        assert_eq!(
            rejection(&args, parse_quote!(fn odd(#[tool(fallback = 1)] a: i64) -> i64 { a })),
            "unsupported parameter property; expected default"
        );
    }

    #[test]
    fn attribute_values_are_checked() {
        let function: ItemFn = parse_quote!(fn wipe() -> bool { true });

        let unknown_level = ToolArgs {
            permission: lit("root"),
            ..ToolArgs::default()
        };
        assert_eq!(
            rejection(&unknown_level, function.clone()),
            "unknown permission level; expected one of safe, elevated, system, dangerous"
        );

        let spaced_name = ToolArgs {
            name: lit("wipe all"),
            ..ToolArgs::default()
        };
        assert_eq!(
            rejection(&spaced_name, function.clone()),
            "tool name must be non-empty and contain no whitespace"
        );

        let dangerous = ToolArgs {
            permission: lit("Dangerous"),
            category: lit("system"),
            tags: lit("disk, , cleanup"),
            ..ToolArgs::default()
        };
        let tokens = compact(&expand(&dangerous, &mut function.clone()).unwrap());
        assert!(tokens.contains("PermissionLevel::Dangerous"));
        assert!(tokens.contains("ToolCategory::System"));
        assert!(tokens.contains(".tag(\"disk\").tag(\"cleanup\")"));
    }
}
