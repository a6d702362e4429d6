//! Source-code splitting via tree-sitter declaration boundaries.
//!
//! Declarations are classified as *structural* (class, interface, enum,
//! namespace, type alias) or *content* (function, method, constructor,
//! arrow assignment). A structural declaration contributes a header chunk
//! ending just past its opening brace and a closing chunk for the brace
//! itself, with members chunked recursively in between; a content
//! declaration is one chunk. Preceding contiguous documentation comments and
//! transparent wrappers (`export`, decorators) stay attached to their
//! declaration, and nested helpers inside function bodies are never
//! boundaries.
//!
//! Chunks are byte slices between cut offsets, so concatenation reproduces
//! the file exactly; whitespace-only slices merge into the preceding chunk.
//! Paths are rooted at the file name: `["app.ts", "Service", "start"]`.

use super::{ContentSplitter, TextSplitter};
use crate::types::{Chunk, Section};
use crate::Result;
use std::collections::BTreeMap;
use tree_sitter::{Node, Parser};

/// Files larger than this receive a semantic parse on the head and
/// line-based splitting on the tail.
const PARSE_LIMIT: usize = 32 * 1024;

/// Languages with tree-sitter grammars wired in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    /// JavaScript (also JSX).
    JavaScript,
    /// TypeScript.
    TypeScript,
    /// TSX.
    Tsx,
    /// Python.
    Python,
}

impl SourceLanguage {
    /// Detects the language from a file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "py" | "pyi" => Some(Self::Python),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
        }
    }

    /// Node kinds that open a structural scope.
    fn structural_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["class_definition"],
            _ => &[
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "enum_declaration",
                "type_alias_declaration",
                "internal_module",
                "module",
            ],
        }
    }

    /// Node kinds that are self-contained content boundaries.
    fn content_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["function_definition"],
            _ => &[
                "function_declaration",
                "generator_function_declaration",
                "method_definition",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryKind {
    Structural,
    Content,
}

#[derive(Debug, Clone)]
struct Cut {
    section: Section,
    boundary: BoundaryKind,
}

/// Tree-sitter based splitter for source files.
pub struct SourceSplitter {
    language: SourceLanguage,
    file_name: String,
    max_size: usize,
    text: TextSplitter,
}

impl SourceSplitter {
    /// Creates a splitter for one file.
    #[must_use]
    pub fn new(language: SourceLanguage, file_name: impl Into<String>, max_size: usize) -> Self {
        Self {
            language,
            file_name: file_name.into(),
            max_size,
            text: TextSplitter::new(max_size),
        }
    }

    /// Splits semantically, returning `None` when the parse fails and the
    /// caller should fall back to text splitting.
    #[must_use]
    pub fn try_split(&self, content: &str) -> Option<Vec<Chunk>> {
        let (head, tail) = split_at_parse_limit(content);

        let mut parser = Parser::new();
        parser.set_language(&self.language.grammar()).ok()?;
        let tree = parser.parse(head, None)?;

        let root_path = vec![self.file_name.clone()];
        let mut cuts: BTreeMap<usize, Cut> = BTreeMap::new();
        self.collect(head, tree.root_node(), &root_path, &mut cuts);

        let mut chunks = self.slices_to_chunks(head, &cuts, &root_path);

        if !tail.is_empty() {
            for piece in self.text.split_text(tail) {
                chunks.push(code_chunk(piece, BoundaryKind::Content, &root_path));
            }
        }
        Some(chunks)
    }

    fn collect(
        &self,
        content: &str,
        container: Node<'_>,
        path: &[String],
        cuts: &mut BTreeMap<usize, Cut>,
    ) {
        let mut cursor = container.walk();
        let children: Vec<Node<'_>> = container.named_children(&mut cursor).collect();
        for (idx, child) in children.iter().enumerate() {
            let inner = unwrap_transparent(*child);
            let kind = inner.kind();

            if self.language.structural_kinds().contains(&kind) {
                let name = declaration_name(content, inner)
                    .unwrap_or_else(|| kind.to_string());
                let mut section_path = path.to_vec();
                section_path.push(name);

                let attached = attached_start(content, &children[..idx], *child);
                insert_cut(cuts, attached, &section_path, BoundaryKind::Structural);

                if let Some(body) = body_of(inner) {
                    let header_end = if content.as_bytes().get(body.start_byte()) == Some(&b'{') {
                        body.start_byte() + 1
                    } else {
                        body.start_byte()
                    };
                    insert_cut(cuts, header_end, &section_path, BoundaryKind::Content);
                    self.collect(content, body, &section_path, cuts);
                    if content.as_bytes().get(body.end_byte().wrapping_sub(1)) == Some(&b'}') {
                        insert_cut(
                            cuts,
                            body.end_byte() - 1,
                            &section_path,
                            BoundaryKind::Structural,
                        );
                    }
                }
            } else if self.is_content_boundary(inner) {
                let name = declaration_name(content, inner)
                    .unwrap_or_else(|| kind.to_string());
                let mut section_path = path.to_vec();
                section_path.push(name);
                let attached = attached_start(content, &children[..idx], *child);
                insert_cut(cuts, attached, &section_path, BoundaryKind::Content);
            }
            // Anything else (imports, consts, fields) is not a boundary and
            // stays inside the preceding chunk's slice.
        }
    }

    fn is_content_boundary(&self, node: Node<'_>) -> bool {
        let kind = node.kind();
        if self.language.content_kinds().contains(&kind) {
            return true;
        }
        // `const f = () => {}` and `var f = function () {}` count as content
        // boundaries when the declarator value is a function.
        if kind == "lexical_declaration" || kind == "variable_declaration" {
            let mut cursor = node.walk();
            return node.named_children(&mut cursor).any(|declarator| {
                declarator
                    .child_by_field_name("value")
                    .is_some_and(|value| {
                        matches!(value.kind(), "arrow_function" | "function_expression" | "function")
                    })
            });
        }
        false
    }

    fn slices_to_chunks(
        &self,
        content: &str,
        cuts: &BTreeMap<usize, Cut>,
        root_path: &[String],
    ) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let offsets: Vec<usize> = cuts.keys().copied().collect();

        let mut push_slice = |chunks: &mut Vec<Chunk>, text: &str, cut: Option<&Cut>| {
            if text.is_empty() {
                return;
            }
            // Whitespace-only gaps attach to the preceding chunk.
            if text.trim().is_empty() {
                if let Some(last) = chunks.last_mut() {
                    last.content.push_str(text);
                    return;
                }
            }
            match cut {
                Some(cut) => {
                    self.push_sized(chunks, text, cut.boundary, &cut.section.path);
                },
                None => self.push_sized(chunks, text, BoundaryKind::Content, root_path),
            }
        };

        match offsets.first() {
            Some(&first) => {
                push_slice(&mut chunks, &content[..first], None);
                for (i, &offset) in offsets.iter().enumerate() {
                    let end = offsets.get(i + 1).copied().unwrap_or(content.len());
                    push_slice(&mut chunks, &content[offset..end], cuts.get(&offset));
                }
            },
            None => push_slice(&mut chunks, content, None),
        }
        chunks
    }

    /// Pushes a chunk, delegating oversized bodies to the text splitter with
    /// ordinal path suffixes.
    fn push_sized(
        &self,
        chunks: &mut Vec<Chunk>,
        text: &str,
        boundary: BoundaryKind,
        path: &[String],
    ) {
        if text.chars().count() <= self.max_size {
            chunks.push(code_chunk(text.to_string(), boundary, path));
            return;
        }
        for (ordinal, piece) in self.text.split_text(text).into_iter().enumerate() {
            let mut sub_path = path.to_vec();
            sub_path.push(format!("[{ordinal}]"));
            chunks.push(code_chunk(piece, boundary, &sub_path));
        }
    }
}

impl ContentSplitter for SourceSplitter {
    fn split(&self, content: &str) -> Result<Vec<Chunk>> {
        match self.try_split(content) {
            Some(chunks) => Ok(chunks),
            None => self.text.split(content),
        }
    }
}

fn code_chunk(content: String, boundary: BoundaryKind, path: &[String]) -> Chunk {
    let boundary_tag = match boundary {
        BoundaryKind::Structural => "structural",
        BoundaryKind::Content => "content",
    };
    Chunk {
        types: vec!["code".to_string(), boundary_tag.to_string()],
        content,
        section: Section {
            level: u32::try_from(path.len()).unwrap_or(u32::MAX),
            path: path.to_vec(),
        },
    }
}

fn insert_cut(cuts: &mut BTreeMap<usize, Cut>, offset: usize, path: &[String], boundary: BoundaryKind) {
    cuts.insert(
        offset,
        Cut {
            section: Section {
                level: u32::try_from(path.len()).unwrap_or(u32::MAX),
                path: path.to_vec(),
            },
            boundary,
        },
    );
}

/// Splits oversized files at a line boundary near the parser limit.
fn split_at_parse_limit(content: &str) -> (&str, &str) {
    if content.len() <= PARSE_LIMIT {
        return (content, "");
    }
    let mut cut = PARSE_LIMIT;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    // Prefer the last newline before the limit so the head parses cleanly.
    if let Some(newline) = content[..cut].rfind('\n') {
        cut = newline + 1;
    }
    content.split_at(cut)
}

/// Unwraps transparent wrappers so `export class A {}` and decorated Python
/// definitions classify by their inner declaration.
fn unwrap_transparent(node: Node<'_>) -> Node<'_> {
    match node.kind() {
        "export_statement" => node
            .child_by_field_name("declaration")
            .or_else(|| {
                let mut cursor = node.walk();
                node.named_children(&mut cursor)
                    .find(|c| c.kind() != "comment")
            })
            .unwrap_or(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .unwrap_or(node),
        _ => node,
    }
}

fn declaration_name(content: &str, node: Node<'_>) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(content[name.byte_range()].to_string());
    }
    // Arrow assignments: take the first declarator's name.
    if matches!(node.kind(), "lexical_declaration" | "variable_declaration") {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if let Some(name) = declarator.child_by_field_name("name") {
                return Some(content[name.byte_range()].to_string());
            }
        }
    }
    None
}

/// Finds the body node of a structural declaration.
fn body_of(node: Node<'_>) -> Option<Node<'_>> {
    if let Some(body) = node.child_by_field_name("body") {
        return Some(body);
    }
    let mut cursor = node.walk();
    node.named_children(&mut cursor).find(|child| {
        matches!(
            child.kind(),
            "class_body" | "interface_body" | "enum_body" | "object_type" | "statement_block" | "block"
        )
    })
}

/// Walks back over contiguous preceding comments so documentation stays
/// attached to its declaration.
fn attached_start(content: &str, preceding: &[Node<'_>], node: Node<'_>) -> usize {
    let mut start = node.start_byte();
    for prev in preceding.iter().rev() {
        if prev.kind() != "comment" {
            break;
        }
        let gap = &content[prev.end_byte()..start];
        if !gap.trim().is_empty() {
            break;
        }
        start = prev.start_byte();
    }
    start
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::assert_reconstructs;
    use super::*;

    fn split_ts(content: &str) -> Vec<Chunk> {
        SourceSplitter::new(SourceLanguage::TypeScript, "File", 5000)
            .split(content)
            .unwrap()
    }

    #[test]
    fn test_class_with_documented_methods() {
        let content = "/**\n * Service.\n */\nclass Svc {\n  /** Does a. */\n  a() {\n    return 1;\n  }\n\n  /** Does b. */\n  b() {\n    return 2;\n  }\n}\n";
        let chunks = split_ts(content);
        assert_reconstructs(content, &chunks);
        assert_eq!(chunks.len(), 4);

        assert!(chunks[0].content.contains("* Service."));
        assert!(chunks[0].content.trim_end().ends_with("class Svc {"));
        assert_eq!(chunks[0].section.path, vec!["File", "Svc"]);
        assert!(chunks[0].types.iter().any(|t| t == "structural"));

        assert!(chunks[1].content.contains("Does a."));
        assert_eq!(chunks[1].section.path, vec!["File", "Svc", "a"]);
        assert!(chunks[1].types.iter().any(|t| t == "content"));

        assert_eq!(chunks[2].section.path, vec!["File", "Svc", "b"]);

        assert!(chunks[3].content.starts_with('}'));
        assert_eq!(chunks[3].section.path, vec!["File", "Svc"]);
        assert!(chunks[3].types.iter().any(|t| t == "structural"));
    }

    #[test]
    fn test_export_wrapper_stays_attached() {
        let content = "// module doc\nexport class Api {\n  run() {}\n}\n";
        let chunks = split_ts(content);
        assert_reconstructs(content, &chunks);
        assert!(chunks[0].content.starts_with("// module doc"));
        assert!(chunks[0].content.contains("export class Api {"));
        assert_eq!(chunks[0].section.path, vec!["File", "Api"]);
    }

    #[test]
    fn test_top_level_function_and_arrow() {
        let content = "function plain() {\n  return 1;\n}\n\nconst arrow = () => {\n  return 2;\n};\n";
        let chunks = split_ts(content);
        assert_reconstructs(content, &chunks);
        let plain = chunks
            .iter()
            .find(|c| c.content.contains("function plain"))
            .unwrap();
        assert_eq!(plain.section.path, vec!["File", "plain"]);
        let arrow = chunks
            .iter()
            .find(|c| c.content.contains("const arrow"))
            .unwrap();
        assert_eq!(arrow.section.path, vec!["File", "arrow"]);
    }

    #[test]
    fn test_nested_helpers_are_not_boundaries() {
        let content = "function outer() {\n  function helper() {\n    return 1;\n  }\n  return helper();\n}\n";
        let chunks = split_ts(content);
        assert_reconstructs(content, &chunks);
        // One chunk only: the helper stays inside outer's body.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section.path, vec!["File", "outer"]);
    }

    #[test]
    fn test_imports_fall_into_file_prelude() {
        let content = "import { x } from \"./x\";\n\nexport function go() {\n  return x;\n}\n";
        let chunks = split_ts(content);
        assert_reconstructs(content, &chunks);
        assert_eq!(chunks[0].section.path, vec!["File"]);
        assert!(chunks[0].content.contains("import"));
        assert_eq!(chunks[1].section.path, vec!["File", "go"]);
    }

    #[test]
    fn test_interface_and_enum_are_structural() {
        let content = "interface Shape {\n  area(): number;\n}\n\nenum Color {\n  Red,\n  Blue,\n}\n";
        let chunks = split_ts(content);
        assert_reconstructs(content, &chunks);
        let shape_header = chunks
            .iter()
            .find(|c| c.content.contains("interface Shape"))
            .unwrap();
        assert_eq!(shape_header.section.path, vec!["File", "Shape"]);
        assert!(shape_header.types.iter().any(|t| t == "structural"));
        assert!(chunks.iter().any(|c| c.content.contains("enum Color")));
    }

    #[test]
    fn test_python_class_and_functions() {
        let content = "class Svc:\n    def a(self):\n        return 1\n\n    def b(self):\n        return 2\n\n\ndef standalone():\n    return 3\n";
        let chunks = SourceSplitter::new(SourceLanguage::Python, "svc.py", 5000)
            .split(content)
            .unwrap();
        assert_reconstructs(content, &chunks);
        assert!(chunks
            .iter()
            .any(|c| c.section.path == vec!["svc.py", "Svc", "a"]));
        assert!(chunks
            .iter()
            .any(|c| c.section.path == vec!["svc.py", "standalone"]));
    }

    #[test]
    fn test_level_equals_path_len() {
        let content = "class A {\n  m() {}\n}\nfunction f() {}\n";
        let chunks = split_ts(content);
        for chunk in &chunks {
            assert_eq!(chunk.section.level as usize, chunk.section.path.len());
        }
    }

    #[test]
    fn test_oversized_body_delegates_with_ordinals() {
        let mut body = String::new();
        for i in 0..200 {
            body.push_str(&format!("  console.log({i});\n"));
        }
        let content = format!("function big() {{\n{body}}}\n");
        let chunks = SourceSplitter::new(SourceLanguage::JavaScript, "big.js", 400)
            .split(&content)
            .unwrap();
        assert_reconstructs(&content, &chunks);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert_eq!(chunk.section.path[..2], ["big.js".to_string(), "big".to_string()]);
        }
        // Ordinal suffixes keep sub-chunks distinct and ordered.
        assert!(chunks[0].section.path.last().unwrap() == "[0]");
    }

    #[test]
    fn test_huge_file_head_parsed_tail_line_split() {
        let mut content = String::from("function head() {\n  return 1;\n}\n");
        while content.len() <= PARSE_LIMIT {
            content.push_str("const filler = 1; // padding line to grow the file beyond the parser limit\n");
        }
        content.push_str("function tail() {\n  return 2;\n}\n");

        let chunks = SourceSplitter::new(SourceLanguage::JavaScript, "huge.js", 5000)
            .split(&content)
            .unwrap();
        assert_reconstructs(&content, &chunks);
        assert!(chunks
            .iter()
            .any(|c| c.section.path.len() >= 2
                && c.section.path[..2] == ["huge.js".to_string(), "head".to_string()]));
        // The tail is line-split under the file root, not parsed.
        assert!(chunks
            .iter()
            .any(|c| c.section.path == vec!["huge.js"] && c.content.contains("function tail")));
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(
            SourceLanguage::from_extension("ts"),
            Some(SourceLanguage::TypeScript)
        );
        assert_eq!(
            SourceLanguage::from_extension("TSX"),
            Some(SourceLanguage::Tsx)
        );
        assert_eq!(
            SourceLanguage::from_extension("py"),
            Some(SourceLanguage::Python)
        );
        assert_eq!(
            SourceLanguage::from_extension("jsx"),
            Some(SourceLanguage::JavaScript)
        );
        assert_eq!(SourceLanguage::from_extension("rs"), None);
    }
}
