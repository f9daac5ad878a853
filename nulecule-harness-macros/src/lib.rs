//! Proc macros for the nulecule functional-test harness
//!
//! Provides the `#[nulecule_harness::test]` attribute macro.

use proc_macro::TokenStream;
use quote::quote;
use syn::{FnArg, ItemFn, Pat, PatType, ReturnType, Type};

/// Attribute macro for provider lifecycle tests.
///
/// Builds a `Session` from the environment, records the provider baseline
/// and injects the resulting `TestCase` into your test function. Whatever
/// the test creates is reaped afterwards, whether it passed or failed.
///
/// # Example
///
/// ```ignore
/// use nulecule_harness::{ObjectKind, TestCase};
/// use std::time::Duration;
///
/// #[nulecule_harness::test]
/// async fn test_wordpress(case: TestCase) {
///     let workdir = case.deploy_app("wordpress-centos7-atomicapp").await.unwrap();
///     case.assert_pod("wordpress", Some("Running"), Duration::from_secs(360)).await.unwrap();
///     case.undeploy(&workdir).await.unwrap();
/// }
/// ```
///
/// # With Result Return Type
///
/// ```ignore
/// #[nulecule_harness::test]
/// async fn test_with_result(case: TestCase) -> Result<(), HarnessError> {
///     case.deploy_app("helloapache").await?;
///     Ok(())
/// }
/// ```
///
/// # What it does
///
/// 1. Initialize logging and build a `Session` with `Session::from_env()`
/// 2. With `#[nulecule_harness::test(bootstrap)]`, restart the provider first
/// 3. Prepare the provider and capture the baseline (`Session::begin`)
/// 4. Run your test with the test case
/// 5. On failure: print baseline vs current diagnostics
/// 6. Always: reap new objects (`TestCase::finish`), then re-raise any failure
///
/// A `case` parameter may be declared `mut` to edit the answers before
/// deploying.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = syn::parse_macro_input!(item as ItemFn);
    let bootstrap = match parse_options(attr.into()) {
        Ok(bootstrap) => bootstrap,
        Err(e) => return e.to_compile_error().into(),
    };
    test_impl(&input_fn, bootstrap).into()
}

/// Parse the attribute arguments: empty, or `bootstrap`
fn parse_options(attr: proc_macro2::TokenStream) -> syn::Result<bool> {
    if attr.is_empty() {
        return Ok(false);
    }
    let ident: syn::Ident = syn::parse2(attr)?;
    if ident == "bootstrap" {
        Ok(true)
    } else {
        Err(syn::Error::new(
            ident.span(),
            "unknown option, expected `bootstrap`",
        ))
    }
}

/// Find the parameter named "case", returning whether it is `mut`
fn case_param(input_fn: &ItemFn) -> Option<bool> {
    input_fn.sig.inputs.iter().find_map(|arg| {
        if let FnArg::Typed(PatType { pat, .. }) = arg {
            if let Pat::Ident(ident) = pat.as_ref() {
                if ident.ident == "case" {
                    return Some(ident.mutability.is_some());
                }
            }
        }
        None
    })
}

/// Explicit return type (e.g., `-> Result<...>`), if any
fn result_type(input_fn: &ItemFn) -> Option<&Type> {
    match &input_fn.sig.output {
        ReturnType::Type(_, ty) => Some(ty.as_ref()),
        ReturnType::Default => None,
    }
}

/// Inner implementation that works with `proc_macro2` types for testability
fn test_impl(input_fn: &ItemFn, bootstrap: bool) -> proc_macro2::TokenStream {
    let fn_name = &input_fn.sig.ident;
    let fn_block = &input_fn.block;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;

    let Some(case_mut) = case_param(input_fn) else {
        // No case parameter - just wrap with tokio::test
        return quote! {
            #(#fn_attrs)*
            #[tokio::test]
            #fn_vis async fn #fn_name() {
                #fn_block
            }
        };
    };

    let test_execution = if let Some(ret_ty) = result_type(input_fn) {
        // Handle Result return type - convert errors to panics for test failure
        quote! {
            let test_result: Result<(), Box<dyn std::error::Error + Send + Sync>> = (async {
                let result: #ret_ty = #fn_block;
                result.map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            }).await;

            if let Err(e) = test_result {
                panic!("{}", e);
            }
        }
    } else {
        quote! {
            (async {
                #fn_block
            }).await;
        }
    };

    let session_mut = if bootstrap { quote!(mut) } else { quote!() };
    let bootstrap_session = if bootstrap {
        quote! {
            session.bootstrap().await
                .unwrap_or_else(|e| panic!("Failed to bootstrap provider: {}", e));
        }
    } else {
        quote!()
    };
    let shutdown_session = if bootstrap {
        quote! {
            if let Err(e) = session.shutdown().await {
                eprintln!("[nulecule] Warning: provider shutdown failed: {}", e);
            }
        }
    } else {
        quote!()
    };
    let case_binding = if case_mut { quote!(mut case) } else { quote!(case) };

    quote! {
        #(#fn_attrs)*
        #[tokio::test]
        #fn_vis async fn #fn_name() {
            use std::panic::AssertUnwindSafe;
            use nulecule_harness::__private::FutureExt;

            nulecule_harness::telemetry::init_logging();

            let #session_mut session = nulecule_harness::Session::from_env()
                .unwrap_or_else(|e| panic!("Failed to configure session: {}", e));
            #bootstrap_session

            let #case_binding = session.begin().await
                .unwrap_or_else(|e| panic!("Failed to begin test case: {}", e));

            // Run test and catch any panics
            let result = AssertUnwindSafe(async {
                #test_execution
            })
            .catch_unwind()
            .await;

            if result.is_err() {
                // Collect and print diagnostics before reaping
                let diag = case.diagnostics().await;
                eprintln!("{}", diag);
            }

            let teardown = case.finish().await;
            #shutdown_session

            match (result, teardown) {
                (Err(panic_info), teardown) => {
                    if let Err(e) = teardown {
                        eprintln!("[nulecule] Warning: teardown failed: {}", e);
                    }
                    // Re-panic to fail the test
                    std::panic::resume_unwind(panic_info);
                }
                (Ok(()), Err(e)) => panic!("Teardown failed: {}", e),
                (Ok(()), Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{case_param, parse_options, result_type, test_impl};
    use syn::ItemFn;

    fn parse_fn(code: &str) -> ItemFn {
        syn::parse_str(code).expect("Failed to parse test function")
    }

    #[test]
    fn test_case_param_with_case() {
        let f = parse_fn("async fn test_it(case: TestCase) {}");
        assert_eq!(case_param(&f), Some(false));
    }

    #[test]
    fn test_case_param_mut() {
        let f = parse_fn("async fn test_it(mut case: TestCase) {}");
        assert_eq!(case_param(&f), Some(true));
    }

    #[test]
    fn test_case_param_without_case() {
        let f = parse_fn("async fn test_it() {}");
        assert_eq!(case_param(&f), None);
    }

    #[test]
    fn test_case_param_different_name() {
        let f = parse_fn("async fn test_it(test_case: TestCase) {}");
        assert_eq!(case_param(&f), None, "Only 'case' name should match");
    }

    #[test]
    fn test_result_type_with_result() {
        let f = parse_fn("async fn test_it(case: TestCase) -> Result<(), HarnessError> {}");
        assert!(result_type(&f).is_some());
    }

    #[test]
    fn test_result_type_without_result() {
        let f = parse_fn("async fn test_it(case: TestCase) {}");
        assert!(result_type(&f).is_none());
    }

    #[test]
    fn test_parse_options() {
        assert!(!parse_options(quote::quote!()).unwrap());
        assert!(parse_options(quote::quote!(bootstrap)).unwrap());
        assert!(parse_options(quote::quote!(teardown)).is_err());
    }

    #[test]
    fn test_impl_with_case_generates_lifecycle() {
        let f = parse_fn("async fn test_app(case: TestCase) { case.deploy(\"app\").await.unwrap(); }");
        let output = test_impl(&f, false).to_string();

        assert!(output.contains("Session :: from_env"), "Should build a Session");
        assert!(output.contains("begin"), "Should capture the baseline");
        assert!(output.contains("tokio :: test"), "Should have tokio::test");
        assert!(output.contains("catch_unwind"), "Should wrap with catch_unwind");
        assert!(output.contains("finish"), "Should always reap");
        assert!(output.contains("diagnostics"), "Should collect diagnostics on failure");
        assert!(!output.contains("bootstrap"), "Should not restart the provider");
    }

    #[test]
    fn test_impl_with_bootstrap_restarts_provider() {
        let f = parse_fn("async fn test_app(case: TestCase) {}");
        let output = test_impl(&f, true).to_string();

        assert!(output.contains("bootstrap"));
        assert!(output.contains("shutdown"));
    }

    #[test]
    fn test_impl_with_result_generates_error_handling() {
        let f = parse_fn("async fn test_app(case: TestCase) -> Result<(), HarnessError> { Ok(()) }");
        let output = test_impl(&f, false).to_string();

        assert!(output.contains("map_err"), "Should convert errors for Result return type");
    }

    #[test]
    fn test_impl_without_case_generates_simple_wrapper() {
        let f = parse_fn("async fn test_simple() { assert!(true); }");
        let output = test_impl(&f, false).to_string();

        assert!(output.contains("tokio :: test"), "Should have tokio::test");
        assert!(!output.contains("Session"), "Should NOT create a Session without case param");
        assert!(!output.contains("catch_unwind"), "Should NOT use catch_unwind without case");
    }

    #[test]
    fn test_impl_preserves_function_name() {
        let f = parse_fn("async fn my_custom_test(case: TestCase) {}");
        let output = test_impl(&f, false).to_string();

        assert!(output.contains("my_custom_test"), "Should preserve function name");
    }
}
