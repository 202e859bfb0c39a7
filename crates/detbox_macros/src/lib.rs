use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat};

/// Time a solver function when the `perf_stats` feature is enabled.
///
/// The function body is wrapped with a guard that logs the elapsed time
/// through `tracing` when the guard drops. Without `perf_stats` the guard is
/// not emitted at all.
///
/// # Features
/// - Auto-detects a `step: &TimeStep` parameter and additionally logs every
///   100th simulation step
/// - Logs when the duration exceeds the threshold (microseconds, default 1000)
///
/// # Example
/// ```ignore
/// #[profile]
/// pub(crate) fn solve(&mut self, step: &TimeStep) {
///     // ... work ...
/// }
///
/// #[profile(250)] // custom threshold in microseconds
/// pub(crate) fn find_new_contacts(&mut self) { ... }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_us: u128 = if attr.is_empty() {
        1000
    } else {
        attr.to_string().trim().parse().unwrap_or(1000)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    // Look for `step: &TimeStep` so the step index can drive periodic logging.
    let has_step_param = sig.inputs.iter().any(|arg| {
        if let FnArg::Typed(pat_type) = arg {
            if let Pat::Ident(pat_ident) = &*pat_type.pat {
                if pat_ident.ident == "step" {
                    let ty = &pat_type.ty;
                    let type_str = quote!(#ty).to_string();
                    return type_str.contains("TimeStep");
                }
            }
        }
        false
    });

    let profile_guard_def = if has_step_param {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
                step_index: u64,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_micros() > #threshold_us || (self.step_index % 100 == 0) {
                        ::tracing::info!("[PERF] {} (step {}): {:?}", self.name, self.step_index, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
                step_index: step.step_index,
            }
        }
    } else {
        quote! {
            struct ProfileGuard {
                name: &'static str,
                start: std::time::Instant,
            }
            impl Drop for ProfileGuard {
                fn drop(&mut self) {
                    let elapsed = self.start.elapsed();
                    if elapsed.as_micros() > #threshold_us {
                        ::tracing::info!("[PERF] {}: {:?}", self.name, elapsed);
                    }
                }
            }
            ProfileGuard {
                name: #fn_name_str,
                start: std::time::Instant::now(),
            }
        }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                #profile_guard_def
            };

            #block
        }
    };

    output.into()
}
