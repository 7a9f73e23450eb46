//! Generic chunk extraction over tree-sitter grammars
//!
//! The extractor is polymorphic over the language registry: each language
//! contributes a grammar, an extraction query, and container kinds; the
//! shared routine here handles decoding, symbol names, qualified names,
//! comment and docstring extraction, error-region recovery, and oversize
//! splitting.

use crate::chunk::{Chunk, ChunkKind};
use crate::error::{ParsingError, ParsingResult};
use crate::languages::{
    get_language_config, kind_for_capture, CommentProfile, LanguageConfig,
};
use crate::markdown;
use crate::split::{split_oversize, MAX_CHUNK_CHARS};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIteratorMut};

// Compiled queries are expensive; cache them per (grammar, query) pair so
// every parse after the first reuses the compiled form.
type QueryCache = HashMap<(usize, &'static str), Arc<Query>>;

lazy_static! {
    static ref QUERY_CACHE: Mutex<QueryCache> = Mutex::new(HashMap::new());
}

fn get_cached_query(language: &Language, query_str: &'static str) -> ParsingResult<Arc<Query>> {
    let lang_ptr = language as *const Language as usize;
    let key = (lang_ptr, query_str);

    {
        let cache = QUERY_CACHE
            .lock()
            .map_err(|_| ParsingError::Other("query cache lock poisoned".to_string()))?;
        if let Some(cached) = cache.get(&key) {
            return Ok(Arc::clone(cached));
        }
    }

    let query = Query::new(language, query_str).map_err(|e| ParsingError::Query {
        language: format!("{lang_ptr:#x}"),
        message: e.to_string(),
    })?;
    let query = Arc::new(query);

    let mut cache = QUERY_CACHE
        .lock()
        .map_err(|_| ParsingError::Other("query cache lock poisoned".to_string()))?;
    cache.insert(key, Arc::clone(&query));
    Ok(query)
}

/// Strip a UTF-8 BOM and decode, or report an encoding failure
fn decode_utf8(bytes: &[u8]) -> ParsingResult<&str> {
    let stripped = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(stripped).map_err(|_| ParsingError::Encoding)
}

/// Extracts ordered semantic chunks from source bytes
///
/// Stateless and cheap to share; per-parse tree-sitter parsers are created
/// on demand because `Parser` is not `Sync`.
#[derive(Debug, Default, Clone)]
pub struct ChunkExtractor;

impl ChunkExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse source bytes for a language into ordered chunks
    ///
    /// Chunks come back in source order, normalized (non-empty trimmed
    /// symbols, non-empty code) and split under the character ceiling.
    ///
    /// # Errors
    /// `ParsingError::Encoding` for non-UTF-8 bytes and
    /// `ParsingError::UnsupportedLanguage` for tags without an extractor;
    /// both are skip conditions for callers, not failures. A grammar-level
    /// total parse failure returns an empty list with a diagnostic.
    pub fn extract(&self, language: &str, bytes: &[u8]) -> ParsingResult<Vec<Chunk>> {
        let text = decode_utf8(bytes)?;

        if language == "markdown" {
            return Ok(finalize(markdown::extract(text)));
        }

        let config = get_language_config(language)
            .filter(|c| c.tree_sitter_language.is_some())
            .ok_or_else(|| ParsingError::UnsupportedLanguage(language.to_string()))?;

        self.extract_with_grammar(config, text)
    }

    fn extract_with_grammar(
        &self,
        config: &'static LanguageConfig,
        text: &str,
    ) -> ParsingResult<Vec<Chunk>> {
        let grammar = config
            .tree_sitter_language
            .as_ref()
            .ok_or_else(|| ParsingError::ParserInit(config.id.to_string()))?;
        let query_str = config
            .query
            .ok_or_else(|| ParsingError::ParserInit(config.id.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(grammar)
            .map_err(|_| ParsingError::ParserInit(config.id.to_string()))?;

        let Some(tree) = parser.parse(text, None) else {
            tracing::warn!(language = config.id, "Total parse failure, emitting no chunks");
            return Ok(Vec::new());
        };
        let root = tree.root_node();

        let query = get_cached_query(grammar, query_str)?;
        let mut chunks = Vec::new();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, text.as_bytes());
        while let Some(match_) = matches.next_mut() {
            for capture in match_.captures {
                let capture_name = query
                    .capture_names()
                    .get(capture.index as usize)
                    .copied()
                    .unwrap_or("block");
                let kind = kind_for_capture(capture_name);

                // Comment captures are ignored for scan-mode languages; the
                // whole-tree scan below produces them instead.
                if kind == ChunkKind::Comment && config.scan_comments {
                    continue;
                }

                chunks.push(self.chunk_from_node(config, text, capture.node, kind));
            }
        }

        if config.scan_comments {
            collect_comment_nodes(root, text, config, &mut chunks);
        }

        if config.comments.string_docstrings {
            collect_docstrings(root, text, config, &mut chunks);
        }

        collect_error_regions(root, text, config, &mut chunks);

        chunks.sort_by_key(|c| (c.start_line, c.end_line));
        let merged = merge_adjacent_comments(chunks);
        Ok(finalize(merged))
    }

    fn chunk_from_node(
        &self,
        config: &LanguageConfig,
        text: &str,
        node: Node<'_>,
        kind: ChunkKind,
    ) -> Chunk {
        let code = node_text(node, text).to_string();
        let (start_line, end_line) = node_lines(node);

        let kind = refine_kind(config, node, kind);
        let symbol = match kind {
            ChunkKind::Comment | ChunkKind::Docstring => comment_symbol(&code, &config.comments),
            _ => node_name(node, text).unwrap_or_default(),
        };
        let qualified_name = qualified_name(config, node, text, &symbol);

        Chunk {
            kind,
            symbol,
            code,
            start_line,
            end_line,
            language: config.id.to_string(),
            qualified_name,
        }
    }
}

/// Normalize, filter empties, and enforce the size ceiling
fn finalize(chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks
        .into_iter()
        .filter_map(Chunk::normalized)
        .flat_map(|c| split_oversize(c, MAX_CHUNK_CHARS))
        .collect()
}

fn node_text<'a>(node: Node<'_>, text: &'a str) -> &'a str {
    text.get(node.byte_range()).unwrap_or("")
}

/// 1-based inclusive line range for a node
fn node_lines(node: Node<'_>) -> (usize, usize) {
    let start = node.start_position().row + 1;
    let end_pos = node.end_position();
    // A node ending at column 0 stops before that row
    let end = if end_pos.column == 0 {
        end_pos.row.max(node.start_position().row)
    } else {
        end_pos.row + 1
    };
    (start, end.max(start))
}

/// A captured function inside a class-like container is a method
fn refine_kind(config: &LanguageConfig, node: Node<'_>, kind: ChunkKind) -> ChunkKind {
    if kind != ChunkKind::Function || config.method_containers.is_empty() {
        return kind;
    }
    let mut current = node.parent();
    while let Some(parent) = current {
        if config.method_containers.contains(&parent.kind()) {
            return ChunkKind::Method;
        }
        current = parent.parent();
    }
    kind
}

/// Best-effort name for a definition node
fn node_name(node: Node<'_>, text: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(name, text).to_string());
    }
    // C-family definitions bury the identifier inside a declarator
    if let Some(declarator) = node.child_by_field_name("declarator") {
        return find_identifier(declarator, text);
    }
    None
}

fn find_identifier(node: Node<'_>, text: &str) -> Option<String> {
    if node.kind().ends_with("identifier") {
        return Some(node_text(node, text).to_string());
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i)
            && let Some(found) = find_identifier(child, text)
        {
            return Some(found);
        }
    }
    None
}

/// Dotted path from the outermost enclosing container to this chunk
fn qualified_name(
    config: &LanguageConfig,
    node: Node<'_>,
    text: &str,
    symbol: &str,
) -> Option<String> {
    if config.container_kinds.is_empty() || symbol.is_empty() {
        return None;
    }
    let mut segments = Vec::new();
    let mut current = node.parent();
    while let Some(parent) = current {
        if config.container_kinds.contains(&parent.kind())
            && let Some(name) = container_name(parent, text)
        {
            segments.push(name);
        }
        current = parent.parent();
    }
    if segments.is_empty() {
        return None;
    }
    segments.reverse();
    segments.push(symbol.to_string());
    Some(segments.join("::"))
}

/// Name of a container node; impl blocks use their type field
fn container_name(node: Node<'_>, text: &str) -> Option<String> {
    if let Some(name) = node.child_by_field_name("name") {
        return Some(node_text(name, text).to_string());
    }
    if let Some(ty) = node.child_by_field_name("type") {
        return Some(node_text(ty, text).to_string());
    }
    None
}

/// Readable symbol for a comment block: first line, markers stripped
fn comment_symbol(code: &str, profile: &CommentProfile) -> String {
    let first = code.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut cleaned = first.trim();
    for prefix in profile.line_prefixes {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim();
            break;
        }
    }
    if let Some((open, close)) = profile.block_delimiters {
        cleaned = cleaned
            .strip_prefix(open)
            .unwrap_or(cleaned)
            .trim_start_matches('*')
            .trim();
        cleaned = cleaned.strip_suffix(close).unwrap_or(cleaned).trim_end();
    }
    cleaned.chars().take(60).collect::<String>().trim().to_string()
}

/// Whole-tree scan for grammars without named comment nodes
fn collect_comment_nodes(
    root: Node<'_>,
    text: &str,
    config: &LanguageConfig,
    chunks: &mut Vec<Chunk>,
) {
    walk(root, &mut |node| {
        if node.kind().contains("comment") {
            let code = node_text(node, text).to_string();
            let (start_line, end_line) = node_lines(node);
            chunks.push(Chunk {
                kind: ChunkKind::Comment,
                symbol: comment_symbol(&code, &config.comments),
                code,
                start_line,
                end_line,
                language: config.id.to_string(),
                qualified_name: None,
            });
            false // comments have no nested comments
        } else {
            true
        }
    });
}

/// Python-style docstrings: a leading expression-statement string in a
/// module, class, or function body
fn collect_docstrings(root: Node<'_>, text: &str, config: &LanguageConfig, chunks: &mut Vec<Chunk>) {
    // Module docstring
    if let Some(first) = root.named_child(0) {
        push_docstring(first, text, config, chunks);
    }
    walk(root, &mut |node| {
        if config.container_kinds.contains(&node.kind())
            && let Some(body) = node.child_by_field_name("body")
            && let Some(first) = body.named_child(0)
        {
            push_docstring(first, text, config, chunks);
        }
        true
    });
}

fn push_docstring(node: Node<'_>, text: &str, config: &LanguageConfig, chunks: &mut Vec<Chunk>) {
    if node.kind() != "expression_statement" {
        return;
    }
    let Some(string_node) = node.named_child(0).filter(|c| c.kind() == "string") else {
        return;
    };
    let code = node_text(string_node, text).to_string();
    let (start_line, end_line) = node_lines(string_node);
    let symbol = comment_symbol(code.trim_matches(['"', '\'']), &config.comments);
    chunks.push(Chunk {
        kind: ChunkKind::Docstring,
        symbol,
        code,
        start_line,
        end_line,
        language: config.id.to_string(),
        qualified_name: None,
    });
}

/// Best-effort recovery: un-parseable regions become BLOCK chunks
fn collect_error_regions(
    root: Node<'_>,
    text: &str,
    config: &LanguageConfig,
    chunks: &mut Vec<Chunk>,
) {
    if !root.has_error() {
        return;
    }
    walk(root, &mut |node| {
        if node.is_error() {
            let code = node_text(node, text).to_string();
            let (start_line, end_line) = node_lines(node);
            chunks.push(Chunk {
                kind: ChunkKind::Block,
                symbol: String::new(), // normalized() generates block_{line}
                code,
                start_line,
                end_line,
                language: config.id.to_string(),
                qualified_name: None,
            });
            false // topmost error region only
        } else {
            true
        }
    });
}

/// Depth-first walk; the callback returns whether to descend
fn walk(node: Node<'_>, f: &mut impl FnMut(Node<'_>) -> bool) {
    if !f(node) {
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(child, f);
        }
    }
}

/// Merge runs of single-line comments on consecutive lines into one block
fn merge_adjacent_comments(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.kind == ChunkKind::Comment
            && let Some(last) = merged.last_mut()
            && last.kind == ChunkKind::Comment
            && chunk.start_line == last.end_line + 1
        {
            last.code.push('\n');
            last.code.push_str(&chunk.code);
            last.end_line = chunk.end_line;
            continue;
        }
        merged.push(chunk);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(language: &str, source: &str) -> Vec<Chunk> {
        ChunkExtractor::new()
            .extract(language, source.as_bytes())
            .unwrap()
    }

    #[test]
    fn rust_function_extraction() {
        let chunks = extract("rust", "fn compute_total(items: &[u32]) -> u32 {\n    items.iter().sum()\n}\n");
        let func = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Function)
            .expect("function chunk");
        assert_eq!(func.symbol, "compute_total");
        assert_eq!(func.start_line, 1);
        assert_eq!(func.end_line, 3);
    }

    #[test]
    fn rust_method_gets_qualified_name() {
        let source = "struct Counter;\nimpl Counter {\n    fn bump(&mut self) {}\n}\n";
        let chunks = extract("rust", source);
        let method = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Method)
            .expect("method chunk");
        assert_eq!(method.symbol, "bump");
        assert_eq!(method.qualified_name.as_deref(), Some("Counter::bump"));
    }

    #[test]
    fn python_function_lines_match_source() {
        let chunks = extract("python", "def compute_total(items):\n    return sum(items)\n");
        let func = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Function)
            .expect("function chunk");
        assert_eq!(func.symbol, "compute_total");
        assert_eq!(func.start_line, 1);
        assert_eq!(func.end_line, 2);
    }

    #[test]
    fn python_method_inside_class() {
        let source = "class Greeter:\n    def hello(self):\n        return 'hi'\n";
        let chunks = extract("python", source);
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Class && c.symbol == "Greeter"));
        let method = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Method)
            .expect("method chunk");
        assert_eq!(method.qualified_name.as_deref(), Some("Greeter::hello"));
    }

    #[test]
    fn python_docstring_extracted() {
        let source = "def f():\n    \"\"\"Adds numbers.\"\"\"\n    return 1\n";
        let chunks = extract("python", source);
        let doc = chunks
            .iter()
            .find(|c| c.kind == ChunkKind::Docstring)
            .expect("docstring chunk");
        assert!(doc.code.contains("Adds numbers"));
    }

    #[test]
    fn consecutive_line_comments_merge() {
        let source = "// first line\n// second line\nfn f() {}\n";
        let chunks = extract("rust", source);
        let comments: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Comment).collect();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].start_line, 1);
        assert_eq!(comments[0].end_line, 2);
        assert!(comments[0].code.contains("second line"));
    }

    #[test]
    fn comment_symbol_strips_markers() {
        let source = "// explains the invariant\nfn f() {}\n";
        let chunks = extract("rust", source);
        let comment = chunks.iter().find(|c| c.kind == ChunkKind::Comment).unwrap();
        assert_eq!(comment.symbol, "explains the invariant");
    }

    #[test]
    fn invalid_utf8_reports_encoding() {
        let result = ChunkExtractor::new().extract("rust", &[0xFF, 0xFE, 0x00]);
        assert!(matches!(result, Err(ParsingError::Encoding)));
    }

    #[test]
    fn bom_is_stripped() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(b"fn f() {}\n");
        let chunks = ChunkExtractor::new().extract("rust", &bytes).unwrap();
        assert!(chunks.iter().any(|c| c.symbol == "f"));
    }

    #[test]
    fn unsupported_language_is_reported() {
        let result = ChunkExtractor::new().extract("toml", b"key = 1\n");
        assert!(matches!(result, Err(ParsingError::UnsupportedLanguage(_))));
    }

    #[test]
    fn syntax_error_degrades_to_block() {
        let source = "fn ok() {}\n%%%% not rust at all @@@@\n";
        let chunks = extract("rust", source);
        assert!(chunks.iter().any(|c| c.symbol == "ok"));
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Block));
    }

    #[test]
    fn all_chunks_satisfy_invariants() {
        let source = "struct S;\n\n// note\nfn f() {}\n\nimpl S {\n    fn m(&self) {}\n}\n";
        for chunk in extract("rust", source) {
            assert!(!chunk.symbol.trim().is_empty());
            assert!(!chunk.code.trim().is_empty());
            assert!(chunk.start_line <= chunk.end_line);
            assert!(chunk.start_line >= 1);
        }
    }

    #[test]
    fn markdown_routes_to_text_adapter() {
        let chunks = extract("markdown", "# Title\n\nSome prose here.\n");
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Header));
        assert!(chunks.iter().any(|c| c.kind == ChunkKind::Paragraph));
    }

    #[test]
    fn oversize_function_is_split_with_part_suffixes() {
        let body: String = (0..4000).map(|i| format!("    let v{i} = {i};\n")).collect();
        let source = format!("fn enormous() {{\n{body}}}\n");
        let chunks = extract("rust", &source);
        let parts: Vec<_> = chunks
            .iter()
            .filter(|c| c.symbol.starts_with("enormous#part"))
            .collect();
        assert!(parts.len() > 1, "expected split parts, got {chunks:?}");
        for part in &parts {
            assert!(part.code.chars().count() <= MAX_CHUNK_CHARS);
        }
    }
}
