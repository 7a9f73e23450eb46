//! Chunk data model: the atomic unit of indexing and search results

use serde::{Deserialize, Serialize};

/// The fixed enumeration of chunk kinds
///
/// Code constructs, prose constructs (markdown), and the BLOCK catch-all for
/// regions the grammar could not interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Trait,
    Namespace,
    Module,
    Variable,
    TypeAlias,
    Macro,
    Comment,
    Docstring,
    Header,
    CodeBlock,
    Paragraph,
    Block,
}

impl ChunkKind {
    /// Stable lowercase tag used in storage and tool responses
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
            Self::Trait => "trait",
            Self::Namespace => "namespace",
            Self::Module => "module",
            Self::Variable => "variable",
            Self::TypeAlias => "type_alias",
            Self::Macro => "macro",
            Self::Comment => "comment",
            Self::Docstring => "docstring",
            Self::Header => "header",
            Self::CodeBlock => "code_block",
            Self::Paragraph => "paragraph",
            Self::Block => "block",
        }
    }

    /// Parse a stored tag back into a kind; unknown tags degrade to BLOCK
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "function" => Self::Function,
            "method" => Self::Method,
            "class" => Self::Class,
            "interface" => Self::Interface,
            "struct" => Self::Struct,
            "enum" => Self::Enum,
            "trait" => Self::Trait,
            "namespace" => Self::Namespace,
            "module" => Self::Module,
            "variable" => Self::Variable,
            "type_alias" => Self::TypeAlias,
            "macro" => Self::Macro,
            "comment" => Self::Comment,
            "docstring" => Self::Docstring,
            "header" => Self::Header,
            "code_block" => Self::CodeBlock,
            "paragraph" => Self::Paragraph,
            _ => Self::Block,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous, semantically meaningful region of a source file
///
/// Invariants enforced before storage: `symbol` is non-empty after trimming
/// (generated fallback `{kind}_{start_line}` otherwise), `code` is non-empty,
/// and `start_line <= end_line` with 1-based inclusive line numbers that
/// refer to the original bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Kind from the fixed enumeration
    pub kind: ChunkKind,
    /// Human name attached to the chunk
    pub symbol: String,
    /// The chunk's source text
    pub code: String,
    /// Starting line number (1-indexed, inclusive)
    pub start_line: usize,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: usize,
    /// Language tag of the owning file
    pub language: String,
    /// Dotted/colon-joined path from the outermost enclosing scope
    pub qualified_name: Option<String>,
}

impl Chunk {
    /// Normalize the symbol: trim it, falling back to `{kind}_{start_line}`
    /// when empty, and verify the chunk carries code worth storing.
    ///
    /// Returns `None` for chunks whose code is empty after trimming; those
    /// are filtered before storage.
    pub fn normalized(mut self) -> Option<Self> {
        if self.code.trim().is_empty() {
            return None;
        }
        let trimmed = self.symbol.trim();
        if trimmed.is_empty() {
            self.symbol = format!("{}_{}", self.kind, self.start_line);
        } else if trimmed.len() != self.symbol.len() {
            self.symbol = trimmed.to_string();
        }
        debug_assert!(self.start_line <= self.end_line);
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(symbol: &str, code: &str) -> Chunk {
        Chunk {
            kind: ChunkKind::Function,
            symbol: symbol.to_string(),
            code: code.to_string(),
            start_line: 3,
            end_line: 5,
            language: "rust".to_string(),
            qualified_name: None,
        }
    }

    #[test]
    fn empty_code_is_filtered() {
        assert!(chunk("name", "   \n\t").normalized().is_none());
    }

    #[test]
    fn empty_symbol_gets_kind_line_fallback() {
        let normalized = chunk("  ", "fn x() {}").normalized().unwrap();
        assert_eq!(normalized.symbol, "function_3");
    }

    #[test]
    fn symbol_whitespace_is_trimmed() {
        let normalized = chunk(" main ", "fn main() {}").normalized().unwrap();
        assert_eq!(normalized.symbol, "main");
    }

    #[test]
    fn kind_tags_round_trip() {
        for kind in [
            ChunkKind::Function,
            ChunkKind::Method,
            ChunkKind::Class,
            ChunkKind::Interface,
            ChunkKind::Struct,
            ChunkKind::Enum,
            ChunkKind::Trait,
            ChunkKind::Namespace,
            ChunkKind::Module,
            ChunkKind::Variable,
            ChunkKind::TypeAlias,
            ChunkKind::Macro,
            ChunkKind::Comment,
            ChunkKind::Docstring,
            ChunkKind::Header,
            ChunkKind::CodeBlock,
            ChunkKind::Paragraph,
            ChunkKind::Block,
        ] {
            assert_eq!(ChunkKind::from_tag(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_tag_degrades_to_block() {
        assert_eq!(ChunkKind::from_tag("widget"), ChunkKind::Block);
    }
}
