//! Grammar-driven extraction of definitions, call sites, and import
//! specifiers from a single source file.
//!
//! Every supported language goes through a native tree-sitter grammar. The
//! walker is shared across grammars: each language only contributes the
//! node kinds that introduce a definition, a call, or an import.

use std::collections::HashMap;

use tree_sitter::{Node, Parser};

use crate::errors::{TreeRootsError, TreeRootsResult};
use crate::models::{DefinitionKind, Language};

/// Nesting deeper than this is not descended into (minified bundles).
const MAX_AST_DEPTH: usize = 400;
const MAX_SIGNATURE_CHARS: usize = 240;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDefinition {
    pub kind: DefinitionKind,
    pub name: String,
    /// `Enclosing.name` for members, the bare name otherwise.
    pub qualified_name: String,
    /// `qualified_name`, suffixed with `#n` for the n-th duplicate.
    pub local_key: String,
    pub signature: String,
    pub source: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// A call made from inside a definition. `caller` indexes
/// [`ParsedFile::definitions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub caller: usize,
    pub callee: String,
    pub arg_count: usize,
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    pub definitions: Vec<ParsedDefinition>,
    /// Raw import specifiers in source order, duplicates removed.
    pub imports: Vec<String>,
    pub calls: Vec<CallSite>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn grammar_for(language: Language) -> tree_sitter::Language {
    match language {
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
    }
}

/// Parse `source` with the grammar for `language`.
///
/// Source containing syntax errors is rejected as a whole so that a broken
/// file never contributes a half-extracted definition set.
pub fn parse_source(source: &str, language: Language) -> TreeRootsResult<ParsedFile> {
    let mut parser = Parser::new();
    parser
        .set_language(&grammar_for(language))
        .map_err(|e| TreeRootsError::Parse(format!("Failed to set language {language}: {e}")))?;

    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| TreeRootsError::Parse(format!("{language} parser produced no tree")))?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(root).unwrap_or(1);
        return Err(TreeRootsError::Parse(format!(
            "syntax error in {language} source near line {line}"
        )));
    }

    let mut extractor = Extractor::new(source, language);
    extractor.visit(root, &Scope::default(), 0);
    Ok(extractor.finish())
}

/// Parse a file whose language is inferred from its path.
pub fn parse_file(path: &str, source: &str) -> TreeRootsResult<ParsedFile> {
    let language = Language::from_path(path)
        .ok_or_else(|| TreeRootsError::Parse(format!("Unsupported language for {path}")))?;
    parse_source(source, language)
}

fn first_error_line(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error_line)
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Scope {
    /// Qualified name of the innermost enclosing class, when the current
    /// node is a direct member of it.
    class_prefix: Option<String>,
    /// Index of the innermost enclosing definition.
    enclosing: Option<usize>,
}

struct Candidate<'t> {
    kind: DefinitionKind,
    name: String,
    span: Node<'t>,
    body: Option<Node<'t>>,
    /// Explicit qualifier that overrides the class prefix (Go receivers).
    qualifier: Option<String>,
}

struct Extractor<'a> {
    source: &'a str,
    language: Language,
    definitions: Vec<ParsedDefinition>,
    imports: Vec<String>,
    calls: Vec<CallSite>,
    seen_keys: HashMap<String, usize>,
}

impl<'a> Extractor<'a> {
    fn new(source: &'a str, language: Language) -> Self {
        Self {
            source,
            language,
            definitions: Vec::new(),
            imports: Vec::new(),
            calls: Vec::new(),
            seen_keys: HashMap::new(),
        }
    }

    fn finish(self) -> ParsedFile {
        ParsedFile {
            definitions: self.definitions,
            imports: self.imports,
            calls: self.calls,
        }
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field)
            .map(|n| self.text(n))
            .filter(|t| !t.is_empty())
    }

    fn visit(&mut self, node: Node<'_>, scope: &Scope, depth: usize) {
        if depth > MAX_AST_DEPTH {
            return;
        }

        self.record_import(node);
        self.record_call(node, scope);

        let inner = match self.candidate(node, scope) {
            Some(candidate) => {
                let kind = candidate.kind;
                let index = self.push_definition(candidate, scope);
                Scope {
                    class_prefix: (kind == DefinitionKind::Class)
                        .then(|| self.definitions[index].qualified_name.clone()),
                    enclosing: Some(index),
                }
            }
            None => scope.clone(),
        };

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, &inner, depth + 1);
        }
    }

    fn push_definition(&mut self, candidate: Candidate<'_>, scope: &Scope) -> usize {
        let prefix = candidate.qualifier.or_else(|| scope.class_prefix.clone());
        let qualified_name = match prefix {
            Some(prefix) => format!("{prefix}.{}", candidate.name),
            None => candidate.name.clone(),
        };

        let occurrence = self.seen_keys.entry(qualified_name.clone()).or_insert(0);
        let local_key = if *occurrence == 0 {
            qualified_name.clone()
        } else {
            format!("{qualified_name}#{occurrence}")
        };
        *occurrence += 1;

        let span = candidate.span;
        let source = self.text(span).to_string();
        let signature = self.signature(span, candidate.body);
        self.definitions.push(ParsedDefinition {
            kind: candidate.kind,
            name: candidate.name,
            qualified_name,
            local_key,
            signature,
            source,
            start_line: span.start_position().row + 1,
            end_line: span.end_position().row + 1,
        });
        self.definitions.len() - 1
    }

    fn signature(&self, span: Node<'_>, body: Option<Node<'_>>) -> String {
        let raw = match body {
            Some(body) if body.start_byte() > span.start_byte() => self
                .source
                .get(span.start_byte()..body.start_byte())
                .unwrap_or(""),
            _ => self.text(span).lines().next().unwrap_or(""),
        };
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim_end_matches(|c: char| c == ':' || c == '{' || c.is_whitespace());
        trimmed.chars().take(MAX_SIGNATURE_CHARS).collect()
    }

    // -- definitions --------------------------------------------------------

    fn candidate<'t>(&self, node: Node<'t>, scope: &Scope) -> Option<Candidate<'t>> {
        match self.language {
            Language::TypeScript | Language::Tsx | Language::JavaScript => {
                self.script_candidate(node)
            }
            Language::Python => self.python_candidate(node, scope),
            Language::Java => self.java_candidate(node),
            Language::Go => self.go_candidate(node),
        }
    }

    fn named<'t>(
        &self,
        node: Node<'t>,
        kind: DefinitionKind,
        span: Node<'t>,
        body: Option<Node<'t>>,
    ) -> Option<Candidate<'t>> {
        let name = self.field_text(node, "name")?;
        Some(Candidate {
            kind,
            name: name.to_string(),
            span,
            body,
            qualifier: None,
        })
    }

    fn script_candidate<'t>(&self, node: Node<'t>) -> Option<Candidate<'t>> {
        let body = node.child_by_field_name("body");
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                self.named(node, DefinitionKind::Function, node, body)
            }
            "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
                self.named(node, DefinitionKind::Class, node, body)
            }
            "method_definition" => self.named(node, DefinitionKind::Method, node, body),
            "public_field_definition" | "field_definition" => {
                let value = node.child_by_field_name("value")?;
                if !is_script_function(value.kind()) {
                    return None;
                }
                let name = self
                    .field_text(node, "name")
                    .or_else(|| self.field_text(node, "property"))?;
                Some(Candidate {
                    kind: DefinitionKind::Method,
                    name: name.to_string(),
                    span: node,
                    body: value.child_by_field_name("body"),
                    qualifier: None,
                })
            }
            "variable_declarator" => {
                let name_node = node.child_by_field_name("name")?;
                if name_node.kind() != "identifier" {
                    return None;
                }
                let value = node.child_by_field_name("value")?;
                let kind = if is_script_function(value.kind()) {
                    DefinitionKind::Function
                } else if value.kind() == "class" {
                    DefinitionKind::Class
                } else {
                    return None;
                };
                Some(Candidate {
                    kind,
                    name: self.text(name_node).to_string(),
                    span: declaration_span(node),
                    body: value.child_by_field_name("body"),
                    qualifier: None,
                })
            }
            _ => None,
        }
    }

    fn python_candidate<'t>(&self, node: Node<'t>, scope: &Scope) -> Option<Candidate<'t>> {
        let body = node.child_by_field_name("body");
        match node.kind() {
            "function_definition" => {
                let kind = if scope.class_prefix.is_some() {
                    DefinitionKind::Method
                } else {
                    DefinitionKind::Function
                };
                self.named(node, kind, node, body)
            }
            "class_definition" => self.named(node, DefinitionKind::Class, node, body),
            "assignment" => {
                let left = node.child_by_field_name("left")?;
                let right = node.child_by_field_name("right")?;
                if left.kind() != "identifier" || right.kind() != "lambda" {
                    return None;
                }
                Some(Candidate {
                    kind: DefinitionKind::Function,
                    name: self.text(left).to_string(),
                    span: declaration_span(node),
                    body: right.child_by_field_name("body"),
                    qualifier: None,
                })
            }
            _ => None,
        }
    }

    fn java_candidate<'t>(&self, node: Node<'t>) -> Option<Candidate<'t>> {
        let body = node.child_by_field_name("body");
        match node.kind() {
            "class_declaration" | "interface_declaration" | "enum_declaration"
            | "record_declaration" => self.named(node, DefinitionKind::Class, node, body),
            "method_declaration" | "constructor_declaration" => {
                self.named(node, DefinitionKind::Method, node, body)
            }
            _ => None,
        }
    }

    fn go_candidate<'t>(&self, node: Node<'t>) -> Option<Candidate<'t>> {
        let body = node.child_by_field_name("body");
        match node.kind() {
            "function_declaration" => self.named(node, DefinitionKind::Function, node, body),
            "method_declaration" => {
                let mut candidate = self.named(node, DefinitionKind::Method, node, body)?;
                candidate.qualifier = node
                    .child_by_field_name("receiver")
                    .and_then(|r| self.go_receiver_type(r));
                Some(candidate)
            }
            "type_spec" => {
                let ty = node.child_by_field_name("type")?;
                if !matches!(ty.kind(), "struct_type" | "interface_type") {
                    return None;
                }
                self.named(node, DefinitionKind::Class, declaration_span(node), Some(ty))
            }
            _ => None,
        }
    }

    /// First type identifier inside a Go receiver list, e.g. `Server` in
    /// `(s *Server)`.
    fn go_receiver_type(&self, receiver: Node<'_>) -> Option<String> {
        if receiver.kind() == "type_identifier" {
            return Some(self.text(receiver).to_string());
        }
        let mut cursor = receiver.walk();
        let children: Vec<Node<'_>> = receiver.named_children(&mut cursor).collect();
        children.into_iter().find_map(|c| self.go_receiver_type(c))
    }

    // -- calls --------------------------------------------------------------

    fn record_call(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(caller) = scope.enclosing else {
            return;
        };
        let callee = match (self.language, node.kind()) {
            (Language::TypeScript | Language::Tsx | Language::JavaScript, "call_expression") => {
                node.child_by_field_name("function")
                    .and_then(|f| self.script_callee(f))
            }
            (Language::TypeScript | Language::Tsx | Language::JavaScript, "new_expression") => {
                node.child_by_field_name("constructor")
                    .filter(|c| c.kind() == "identifier")
                    .map(|c| self.text(c))
            }
            (Language::Python, "call") => node.child_by_field_name("function").and_then(|f| {
                match f.kind() {
                    "identifier" => Some(self.text(f)),
                    "attribute" => self.field_text(f, "attribute"),
                    _ => None,
                }
            }),
            (Language::Java, "method_invocation") => self.field_text(node, "name"),
            (Language::Java, "object_creation_expression") => node
                .child_by_field_name("type")
                .filter(|t| t.kind() == "type_identifier")
                .map(|t| self.text(t)),
            (Language::Go, "call_expression") => {
                node.child_by_field_name("function").and_then(|f| match f.kind() {
                    "identifier" => Some(self.text(f)),
                    "selector_expression" => self.field_text(f, "field"),
                    _ => None,
                })
            }
            _ => None,
        };
        let Some(callee) = callee.filter(|c| !c.is_empty()) else {
            return;
        };
        let arg_count = node
            .child_by_field_name("arguments")
            .map(|a| a.named_child_count())
            .unwrap_or(0);
        self.calls.push(CallSite {
            caller,
            callee: callee.to_string(),
            arg_count,
            line: node.start_position().row + 1,
        });
    }

    fn script_callee(&self, function: Node<'_>) -> Option<&'a str> {
        match function.kind() {
            "identifier" => {
                let name = self.text(function);
                (name != "require").then_some(name)
            }
            "member_expression" => self.field_text(function, "property"),
            _ => None,
        }
    }

    // -- imports ------------------------------------------------------------

    fn push_import(&mut self, specifier: &str) {
        let specifier = specifier.trim();
        if specifier.is_empty() || self.imports.iter().any(|s| s == specifier) {
            return;
        }
        self.imports.push(specifier.to_string());
    }

    fn record_import(&mut self, node: Node<'_>) {
        match (self.language, node.kind()) {
            (
                Language::TypeScript | Language::Tsx | Language::JavaScript,
                "import_statement" | "export_statement",
            ) => {
                if let Some(source) = node.child_by_field_name("source") {
                    let spec = strip_quotes(self.text(source));
                    self.push_import(spec);
                }
            }
            (Language::TypeScript | Language::Tsx | Language::JavaScript, "call_expression") => {
                let Some(function) = node.child_by_field_name("function") else {
                    return;
                };
                let is_loader = match function.kind() {
                    "import" => true,
                    "identifier" => self.text(function) == "require",
                    _ => false,
                };
                if !is_loader {
                    return;
                }
                let first_arg = node
                    .child_by_field_name("arguments")
                    .and_then(|args| args.named_child(0))
                    .filter(|arg| arg.kind() == "string");
                if let Some(arg) = first_arg {
                    let spec = strip_quotes(self.text(arg));
                    self.push_import(spec);
                }
            }
            (Language::Python, "import_statement") => {
                for spec in self.python_imported_names(node) {
                    self.push_import(&spec);
                }
            }
            (Language::Python, "import_from_statement") => {
                let Some(module) = node.child_by_field_name("module_name") else {
                    return;
                };
                let module_text = self.text(module);
                let spec = python_module_specifier(module_text);
                // `from . import helpers` may name sibling modules.
                if module_text.chars().all(|c| c == '.') {
                    for name in self.python_imported_names(node) {
                        let joined = if spec == "." {
                            format!("./{}", name.replace('.', "/"))
                        } else {
                            format!("{spec}/{}", name.replace('.', "/"))
                        };
                        self.push_import(&joined);
                    }
                }
                self.push_import(&spec);
            }
            (Language::Java, "import_declaration") => {
                let mut cursor = node.walk();
                let target = node
                    .named_children(&mut cursor)
                    .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"));
                if let Some(target) = target {
                    let spec = self.text(target);
                    self.push_import(spec);
                }
            }
            (Language::Go, "import_spec") => {
                if let Some(path) = node.child_by_field_name("path") {
                    let spec = strip_quotes(self.text(path));
                    self.push_import(spec);
                }
            }
            _ => {}
        }
    }

    fn python_imported_names(&self, node: Node<'_>) -> Vec<String> {
        let mut cursor = node.walk();
        node.children_by_field_name("name", &mut cursor)
            .filter_map(|n| match n.kind() {
                "aliased_import" => self.field_text(n, "name"),
                _ => Some(self.text(n)),
            })
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn is_script_function(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

/// Widen a binding node to its enclosing declaration when it is the only
/// binding there, so the source text includes the `const`/`var`/`type`.
fn declaration_span(node: Node<'_>) -> Node<'_> {
    match node.parent() {
        Some(parent)
            if matches!(
                parent.kind(),
                "lexical_declaration"
                    | "variable_declaration"
                    | "type_declaration"
                    | "expression_statement"
            ) && parent.named_child_count() == 1 =>
        {
            parent
        }
        _ => node,
    }
}

fn strip_quotes(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

/// Rewrite a Python module reference into a path-like specifier:
/// `.a.b` becomes `./a/b`, `..a` becomes `../a`, `pkg.mod` stays dotted.
pub fn python_module_specifier(module: &str) -> String {
    let dots = module.chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return module.to_string();
    }
    let rest = module[dots..].replace('.', "/");
    let mut prefix = if dots == 1 {
        ".".to_string()
    } else {
        vec![".."; dots - 1].join("/")
    };
    if !rest.is_empty() {
        prefix.push('/');
        prefix.push_str(&rest);
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(parsed: &ParsedFile) -> Vec<&str> {
        parsed.definitions.iter().map(|d| d.local_key.as_str()).collect()
    }

    fn calls_from<'p>(parsed: &'p ParsedFile, caller_key: &str) -> Vec<&'p str> {
        parsed
            .calls
            .iter()
            .filter(|c| parsed.definitions[c.caller].local_key == caller_key)
            .map(|c| c.callee.as_str())
            .collect()
    }

    #[test]
    fn test_typescript_definitions_and_calls() {
        let source = r#"import { bar } from "./b";
import type { Opts } from '../types';

export function foo(x: number): number {
  return bar(x, 2);
}

export class Widget {
  render(): void {
    this.paint();
    helper();
  }
  paint() {}
  onClick = () => {
    foo(1);
  };
}

const helper = () => {
  return new Widget();
};
"#;
        let parsed = parse_source(source, Language::TypeScript).unwrap();
        assert_eq!(
            keys(&parsed),
            vec![
                "foo",
                "Widget",
                "Widget.render",
                "Widget.paint",
                "Widget.onClick",
                "helper"
            ]
        );
        assert_eq!(parsed.imports, vec!["./b", "../types"]);

        let foo = &parsed.definitions[0];
        assert_eq!(foo.kind, DefinitionKind::Function);
        assert_eq!(foo.start_line, 4);
        assert_eq!(foo.end_line, 6);
        assert_eq!(foo.signature, "function foo(x: number): number");

        let helper = &parsed.definitions[5];
        assert_eq!(helper.kind, DefinitionKind::Function);
        assert!(helper.source.starts_with("const helper"));

        assert_eq!(calls_from(&parsed, "foo"), vec!["bar"]);
        assert_eq!(calls_from(&parsed, "Widget.render"), vec!["paint", "helper"]);
        assert_eq!(calls_from(&parsed, "Widget.onClick"), vec!["foo"]);
        assert_eq!(calls_from(&parsed, "helper"), vec!["Widget"]);

        let bar_call = parsed.calls.iter().find(|c| c.callee == "bar").unwrap();
        assert_eq!(bar_call.arg_count, 2);
        assert_eq!(bar_call.line, 5);
    }

    #[test]
    fn test_duplicate_names_get_occurrence_suffix() {
        let source = "function handler() {}\nfunction handler() {}\nfunction handler() {}\n";
        let parsed = parse_source(source, Language::JavaScript).unwrap();
        assert_eq!(keys(&parsed), vec!["handler", "handler#1", "handler#2"]);
        assert!(parsed.definitions.iter().all(|d| d.name == "handler"));
    }

    #[test]
    fn test_javascript_require_and_reexport() {
        let source = r#"const util = require('./util');
export { thing } from "./thing.js";
function main() {
  util.run();
}
"#;
        let parsed = parse_source(source, Language::JavaScript).unwrap();
        assert_eq!(parsed.imports, vec!["./util", "./thing.js"]);
        assert_eq!(keys(&parsed), vec!["main"]);
        assert_eq!(calls_from(&parsed, "main"), vec!["run"]);
    }

    #[test]
    fn test_top_level_calls_are_not_recorded() {
        let source = "function a() {}\na();\n";
        let parsed = parse_source(source, Language::JavaScript).unwrap();
        assert!(parsed.calls.is_empty());
    }

    #[test]
    fn test_python_methods_lambdas_and_imports() {
        let source = r#"import os
from .utils import slugify
from .. import settings
from . import helpers, models as m

class Repo:
    def save(self, item):
        return slugify(item.name)

    @property
    def size(self):
        return len(self.items)

def main():
    Repo().save(1)

shout = lambda s: s.upper()
"#;
        let parsed = parse_source(source, Language::Python).unwrap();
        assert_eq!(
            keys(&parsed),
            vec!["Repo", "Repo.save", "Repo.size", "main", "shout"]
        );
        assert_eq!(parsed.definitions[1].kind, DefinitionKind::Method);
        assert_eq!(parsed.definitions[3].kind, DefinitionKind::Function);
        assert_eq!(parsed.definitions[4].kind, DefinitionKind::Function);
        assert_eq!(parsed.definitions[1].signature, "def save(self, item)");

        assert_eq!(
            parsed.imports,
            vec!["os", "./utils", "../settings", "..", "./helpers", "./models", "."]
        );
        assert_eq!(calls_from(&parsed, "Repo.save"), vec!["slugify"]);
        assert_eq!(calls_from(&parsed, "main"), vec!["save", "Repo"]);
        assert_eq!(calls_from(&parsed, "shout"), vec!["upper"]);
    }

    #[test]
    fn test_java_classes_and_overloads() {
        let source = r#"import com.example.util.Strings;

public class Greeter {
    public Greeter() {}
    public String greet(String name) { return Strings.upper(name); }
    public String greet() { return greet("world"); }
}
"#;
        let parsed = parse_source(source, Language::Java).unwrap();
        assert_eq!(
            keys(&parsed),
            vec!["Greeter", "Greeter.Greeter", "Greeter.greet", "Greeter.greet#1"]
        );
        assert_eq!(parsed.imports, vec!["com.example.util.Strings"]);
        assert_eq!(calls_from(&parsed, "Greeter.greet"), vec!["upper"]);
        assert_eq!(calls_from(&parsed, "Greeter.greet#1"), vec!["greet"]);
    }

    #[test]
    fn test_go_methods_use_receiver_type() {
        let source = r#"package server

import (
    "fmt"
    "./store"
)

type Server struct {
    name string
}

func (s *Server) Start(port int) error {
    fmt.Println(s.name)
    return listen(port)
}

func listen(port int) error {
    return nil
}
"#;
        let parsed = parse_source(source, Language::Go).unwrap();
        assert_eq!(keys(&parsed), vec!["Server", "Server.Start", "listen"]);
        assert_eq!(parsed.definitions[0].kind, DefinitionKind::Class);
        assert_eq!(parsed.imports, vec!["fmt", "./store"]);
        assert_eq!(calls_from(&parsed, "Server.Start"), vec!["Println", "listen"]);
    }

    #[test]
    fn test_syntax_error_is_rejected() {
        let err = parse_source("function broken( {\n", Language::JavaScript).unwrap_err();
        assert!(matches!(err, TreeRootsError::Parse(_)));
    }

    #[test]
    fn test_parse_file_detects_language() {
        let parsed = parse_file("src/App.tsx", "export const App = () => <div />;\n").unwrap();
        assert_eq!(keys(&parsed), vec!["App"]);
        assert!(parse_file("notes.txt", "hello").is_err());
    }

    #[test]
    fn test_python_module_specifier() {
        assert_eq!(python_module_specifier(".utils"), "./utils");
        assert_eq!(python_module_specifier("..pkg.mod"), "../pkg/mod");
        assert_eq!(python_module_specifier("..."), "../..");
        assert_eq!(python_module_specifier("."), ".");
        assert_eq!(python_module_specifier("os.path"), "os.path");
    }
}
