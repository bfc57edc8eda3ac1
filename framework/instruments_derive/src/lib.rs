use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitStr, Path, ReturnType};

/// Record an operation for every call to an instrumented async method.
///
/// The method must take `&self` or `&mut self`, return a `Result`, and the type it is defined on
/// must have a `reporter: Arc<gust_instruments::Reporter>` field. The operation id is the method
/// name, optionally with a prefix: `#[gust_instrument(prefix = "http_")]`.
///
/// A `post_hook = some_fn` is called with `&mut OperationRecord` and the method's result before
/// the record is reported, so it can attach attributes that depend on the outcome.
#[proc_macro_attribute]
pub fn gust_instrument(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut prefix = String::new();
    let mut post_hook: Option<Path> = None;
    let args_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("prefix") {
            prefix = meta.value()?.parse::<LitStr>()?.value();
            Ok(())
        } else if meta.path.is_ident("post_hook") {
            post_hook = Some(meta.value()?.parse::<Path>()?);
            Ok(())
        } else {
            Err(meta.error("unsupported gust_instrument argument"))
        }
    });
    parse_macro_input!(args with args_parser);

    let mut input = parse_macro_input!(input as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(&input.sig, "gust_instrument only supports async functions")
            .to_compile_error()
            .into();
    }

    let output_ty = match &input.sig.output {
        ReturnType::Type(_, ty) => ty.clone(),
        ReturnType::Default => {
            return syn::Error::new_spanned(&input.sig, "gust_instrument requires a Result return type")
                .to_compile_error()
                .into();
        }
    };

    let operation_id = format!("{}{}", prefix, input.sig.ident);
    let body = &input.block;

    input.block = match post_hook {
        Some(post_hook) => syn::parse_quote! {
            {
                let mut operation_record = gust_instruments::OperationRecord::new(#operation_id.to_string());
                let result: #output_ty = async #body.await;
                #post_hook(&mut operation_record, &result);
                gust_instruments::report_operation(self.reporter.clone(), operation_record, &result);
                result
            }
        },
        None => syn::parse_quote! {
            {
                let operation_record = gust_instruments::OperationRecord::new(#operation_id.to_string());
                let result: #output_ty = async #body.await;
                gust_instruments::report_operation(self.reporter.clone(), operation_record, &result);
                result
            }
        },
    };

    TokenStream::from(quote!(#input))
}
