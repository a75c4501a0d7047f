#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! AST-level test to keep `.unwrap()` and `.expect()` out of library code.
//!
//! A panic in the push read loop ends the listener task without a
//! `Disconnected` event, so subscribers never learn the stream is gone.
//! Errors go through `CliError` instead.
//!
//! Skipped:
//! - `#[cfg(test)]` modules and `#[test]` functions
//! - functions carrying `#[allow(clippy::expect_used)]` or
//!   `#[allow(clippy::unwrap_used)]` (literal regex compilation)
//!
//! Example of bad code:
//! ```ignore
//! let port = value.parse::<u16>().unwrap();
//! ```
//!
//! Example of correct code:
//! ```ignore
//! let port = value.parse::<u16>().map_err(|_| CliError::MalformedResponse { .. })?;
//! ```

use std::fs;
use std::path::Path;
use syn::visit::Visit;
use syn::{Attribute, ExprMethodCall, File, ImplItemFn, ItemFn, ItemMod};
use walkdir::WalkDir;

struct UnwrapVisitor {
    current_file: String,
    current_fn: Option<String>,
    violations: Vec<(String, String)>,
}

impl UnwrapVisitor {
    fn new(file: String) -> Self {
        Self {
            current_file: file,
            current_fn: None,
            violations: Vec::new(),
        }
    }
}

fn is_cfg_test(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        (attr.path().is_ident("cfg")
            && attr
                .parse_args::<syn::Ident>()
                .map(|ident| ident == "test")
                .unwrap_or(false))
            || attr.path().is_ident("test")
            || attr
                .path()
                .segments
                .last()
                .is_some_and(|s| s.ident == "test")
    })
}

fn allows_panicking_calls(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| {
        if !attr.path().is_ident("allow") {
            return false;
        }
        let tokens = match &attr.meta {
            syn::Meta::List(list) => list.tokens.to_string(),
            _ => return false,
        };
        tokens.contains("expect_used") || tokens.contains("unwrap_used")
    })
}

impl<'ast> Visit<'ast> for UnwrapVisitor {
    fn visit_item_mod(&mut self, module: &'ast ItemMod) {
        if !is_cfg_test(&module.attrs) {
            syn::visit::visit_item_mod(self, module);
        }
    }

    fn visit_item_fn(&mut self, item: &'ast ItemFn) {
        if is_cfg_test(&item.attrs) || allows_panicking_calls(&item.attrs) {
            return;
        }
        let previous = self.current_fn.replace(item.sig.ident.to_string());
        syn::visit::visit_item_fn(self, item);
        self.current_fn = previous;
    }

    fn visit_impl_item_fn(&mut self, item: &'ast ImplItemFn) {
        if is_cfg_test(&item.attrs) || allows_panicking_calls(&item.attrs) {
            return;
        }
        let previous = self.current_fn.replace(item.sig.ident.to_string());
        syn::visit::visit_impl_item_fn(self, item);
        self.current_fn = previous;
    }

    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        let method = call.method.to_string();
        if method == "unwrap" || method == "expect" {
            let location = self.current_fn.as_deref().unwrap_or("<item>");
            self.violations.push((
                self.current_file.clone(),
                format!(".{}() in {}", method, location),
            ));
        }
        syn::visit::visit_expr_method_call(self, call);
    }
}

fn analyze_source(name: &str, content: &str) -> Vec<(String, String)> {
    let syntax: File = match syn::parse_file(content) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Warning: Failed to parse {}: {}", name, e);
            return vec![];
        }
    };

    let mut visitor = UnwrapVisitor::new(name.to_string());
    visitor.visit_file(&syntax);
    visitor.violations
}

#[test]
fn detects_unwrap_and_expect() {
    let code = r#"
        fn port(value: &str) -> u16 {
            value.parse().unwrap()
        }
        impl Reader {
            fn line(&self) -> String {
                self.next().expect("line")
            }
        }
    "#;
    let violations = analyze_source("test.rs", code);
    assert_eq!(violations.len(), 2);
    assert!(violations[0].1.contains("port"));
    assert!(violations[1].1.contains("line"));
}

#[test]
fn allows_fallible_alternatives() {
    let code = r#"
        fn port(value: &str) -> u16 {
            value.parse().unwrap_or(9090)
        }
        fn volume(raw: Option<u8>) -> u8 {
            raw.unwrap_or_default()
        }
    "#;
    assert!(analyze_source("test.rs", code).is_empty());
}

#[test]
fn skips_tests_and_allowed_functions() {
    let code = r#"
        #[allow(clippy::expect_used)]
        fn compile(pattern: &str) -> Regex {
            Regex::new(pattern).expect("literal")
        }

        #[cfg(test)]
        mod tests {
            #[test]
            fn parses() {
                "1".parse::<u8>().unwrap();
            }
        }
    "#;
    assert!(analyze_source("test.rs", code).is_empty());
}

#[test]
fn no_unwrap_in_library_code() {
    let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");

    let mut all_violations = Vec::new();

    for entry in WalkDir::new(&src_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
    {
        if let Ok(content) = fs::read_to_string(entry.path()) {
            all_violations.extend(analyze_source(
                &entry.path().display().to_string(),
                &content,
            ));
        }
    }

    if !all_violations.is_empty() {
        let mut error_msg = String::from(
            "\n\nFound .unwrap()/.expect() in library code!\n\
             Return a CliError (or anyhow::Error in the binary) instead.\n\n\
             Violations:\n",
        );

        for (file, context) in &all_violations {
            error_msg.push_str(&format!("  - {}: {}\n", file, context));
        }

        panic!("{}", error_msg);
    }
}
