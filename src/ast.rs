//! Tree-sitter-based Rust symbol extraction and structural predicates.
//!
//! Used by the static validator (structure/imports/error-handling checks)
//! and by the extension engine's syntax-validation step.

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RustSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub is_public: bool,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Struct,
    Enum,
    Trait,
    Impl,
    TypeAlias,
    Const,
    Static,
    Mod,
    Macro,
}

/// Parse result for a single Rust source string: whether it parsed without
/// a hard error, plus everything extracted from the tree.
#[derive(Debug, Clone, Default)]
pub struct RustParse {
    pub has_error: bool,
    pub error_message: Option<String>,
    pub symbols: Vec<RustSymbol>,
    pub has_use_or_extern_crate: bool,
    pub has_try_operator: bool,
}

impl RustParse {
    pub fn parse(source: &str) -> Self {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .expect("tree-sitter-rust language");

        let tree = match parser.parse(source, None) {
            Some(t) => t,
            None => {
                return Self {
                    has_error: true,
                    error_message: Some("tree-sitter failed to produce a parse tree".to_string()),
                    ..Self::default()
                }
            }
        };

        let root = tree.root_node();
        let source_bytes = source.as_bytes();
        let mut symbols = Vec::new();
        let mut has_use_or_extern_crate = false;
        let mut has_try_operator = false;
        let mut first_error: Option<String> = None;

        walk(
            root,
            source_bytes,
            &mut symbols,
            &mut has_use_or_extern_crate,
            &mut has_try_operator,
            &mut first_error,
        );

        Self {
            has_error: root.has_error() || first_error.is_some(),
            error_message: first_error,
            symbols,
            has_use_or_extern_crate,
            has_try_operator,
        }
    }

    pub fn has_function_or_type(&self) -> bool {
        self.symbols.iter().any(|s| {
            matches!(
                s.kind,
                SymbolKind::Function | SymbolKind::Struct | SymbolKind::Enum | SymbolKind::Trait | SymbolKind::Impl
            )
        })
    }

    pub fn functions(&self) -> Vec<&RustSymbol> {
        self.symbols.iter().filter(|s| s.kind == SymbolKind::Function).collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    node: Node,
    source: &[u8],
    symbols: &mut Vec<RustSymbol>,
    has_use_or_extern_crate: &mut bool,
    has_try_operator: &mut bool,
    first_error: &mut Option<String>,
) {
    match node.kind() {
        "function_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Function) {
                symbols.push(sym);
            }
        }
        "struct_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Struct) {
                symbols.push(sym);
            }
        }
        "enum_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Enum) {
                symbols.push(sym);
            }
        }
        "trait_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Trait) {
                symbols.push(sym);
            }
        }
        "impl_item" => {
            symbols.push(extract_impl(node, source));
        }
        "type_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::TypeAlias) {
                symbols.push(sym);
            }
        }
        "const_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Const) {
                symbols.push(sym);
            }
        }
        "static_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Static) {
                symbols.push(sym);
            }
        }
        "mod_item" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Mod) {
                symbols.push(sym);
            }
        }
        "macro_definition" => {
            if let Some(sym) = extract_named(node, source, SymbolKind::Macro) {
                symbols.push(sym);
            }
        }
        "use_declaration" | "extern_crate_declaration" => {
            *has_use_or_extern_crate = true;
        }
        "try_expression" => {
            *has_try_operator = true;
        }
        "ERROR" => {
            if first_error.is_none() {
                *first_error = Some(
                    node.utf8_text(source)
                        .unwrap_or("<unparseable>")
                        .lines()
                        .next()
                        .unwrap_or("<unparseable>")
                        .to_string(),
                );
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, symbols, has_use_or_extern_crate, has_try_operator, first_error);
    }
}

fn extract_named(node: Node, source: &[u8], kind: SymbolKind) -> Option<RustSymbol> {
    let name = node.child_by_field_name("name").and_then(|n| n.utf8_text(source).ok())?;
    Some(RustSymbol {
        name: name.to_string(),
        kind,
        is_public: is_public(node, source),
        start_line: node.start_position().row,
        end_line: node.end_position().row,
        signature: first_line(node, source),
    })
}

fn extract_impl(node: Node, source: &[u8]) -> RustSymbol {
    let signature = first_line(node, source);
    let name = signature.trim_end_matches('{').trim().to_string();
    RustSymbol {
        name,
        kind: SymbolKind::Impl,
        is_public: false,
        start_line: node.start_position().row,
        end_line: node.end_position().row,
        signature,
    }
}

fn is_public(node: Node, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "visibility_modifier" {
            if let Ok(text) = child.utf8_text(source) {
                return text.starts_with("pub");
            }
        }
    }
    false
}

fn first_line(node: Node, source: &[u8]) -> String {
    node.utf8_text(source).ok().and_then(|text| text.lines().next()).unwrap_or("").to_string()
}

/// Whether `source` contains a Rust doc comment (`///`, `//!`, `/** */`).
pub fn has_doc_comment(source: &str) -> bool {
    source.contains("///") || source.contains("//!") || source.contains("/**")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
use std::fmt;

/// A widget.
pub struct Widget {
    pub name: String,
}

impl Widget {
    pub fn render(&self) -> Result<String, fmt::Error> {
        let s = self.try_render()?;
        Ok(s)
    }

    fn try_render(&self) -> Result<String, fmt::Error> {
        Ok(self.name.clone())
    }
}
"#;

    #[test]
    fn extracts_struct_impl_and_function() {
        let parse = RustParse::parse(SAMPLE);
        assert!(!parse.has_error);
        assert!(parse.has_function_or_type());
        assert!(parse.symbols.iter().any(|s| s.name == "Widget" && s.kind == SymbolKind::Struct));
        assert!(parse.functions().iter().any(|f| f.name == "render"));
    }

    #[test]
    fn detects_use_and_try_operator() {
        let parse = RustParse::parse(SAMPLE);
        assert!(parse.has_use_or_extern_crate);
        assert!(parse.has_try_operator);
    }

    #[test]
    fn flags_syntax_errors() {
        let broken = "pub fn broken( -> {";
        let parse = RustParse::parse(broken);
        assert!(parse.has_error);
    }

    #[test]
    fn doc_comment_detection() {
        assert!(has_doc_comment("/// hi\nfn f() {}"));
        assert!(!has_doc_comment("// hi\nfn f() {}"));
    }
}
