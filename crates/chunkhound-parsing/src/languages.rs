//! Language-specific configurations for chunk extraction
//!
//! This module centralizes all language-specific knowledge: tree-sitter
//! grammars, extraction queries (capture names are `ChunkKind` tags), the
//! container node kinds used for qualified names and method detection, and
//! the comment profile consumed by the shared text-cleanup routine.

use crate::chunk::ChunkKind;
use lazy_static::lazy_static;
use std::collections::HashMap;
use tree_sitter::Language;

/// Comment syntax profile consumed by the generic comment/docstring routine
#[derive(Debug, Clone, Copy)]
pub struct CommentProfile {
    /// Line-comment prefixes (e.g. `//`, `#`)
    pub line_prefixes: &'static [&'static str],
    /// Block-comment delimiters, open/close
    pub block_delimiters: Option<(&'static str, &'static str)>,
    /// Whether docstrings are expression-statement strings (Python style)
    pub string_docstrings: bool,
}

impl CommentProfile {
    const fn none() -> Self {
        Self {
            line_prefixes: &[],
            block_delimiters: None,
            string_docstrings: false,
        }
    }
}

/// Configuration for a specific language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// The language identifier (e.g., "rust", "python")
    pub id: &'static str,
    /// File extensions associated with this language
    pub extensions: &'static [&'static str],
    /// Exact filenames associated with this language (e.g. "Makefile")
    pub filenames: &'static [&'static str],
    /// Tree-sitter grammar; `None` for text-adapter or detect-only languages
    pub tree_sitter_language: Option<Language>,
    /// Extraction query; capture names are `ChunkKind` tags
    pub query: Option<&'static str>,
    /// Node kinds that contribute segments to qualified names
    pub container_kinds: &'static [&'static str],
    /// Container kinds inside which a captured `function` becomes a `method`
    pub method_containers: &'static [&'static str],
    /// Use the whole-tree node-kind scan for comments instead of query captures
    pub scan_comments: bool,
    /// Comment syntax profile
    pub comments: CommentProfile,
}

impl LanguageConfig {
    const fn new(id: &'static str) -> Self {
        Self {
            id,
            extensions: &[],
            filenames: &[],
            tree_sitter_language: None,
            query: None,
            container_kinds: &[],
            method_containers: &[],
            scan_comments: false,
            comments: CommentProfile::none(),
        }
    }

    const fn with_extensions(mut self, extensions: &'static [&'static str]) -> Self {
        self.extensions = extensions;
        self
    }

    const fn with_filenames(mut self, filenames: &'static [&'static str]) -> Self {
        self.filenames = filenames;
        self
    }

    fn with_tree_sitter(mut self, language: Language, query: &'static str) -> Self {
        self.tree_sitter_language = Some(language);
        self.query = Some(query);
        self
    }

    const fn with_containers(
        mut self,
        container_kinds: &'static [&'static str],
        method_containers: &'static [&'static str],
    ) -> Self {
        self.container_kinds = container_kinds;
        self.method_containers = method_containers;
        self
    }

    const fn with_comment_scan(mut self) -> Self {
        self.scan_comments = true;
        self
    }

    const fn with_comments(mut self, comments: CommentProfile) -> Self {
        self.comments = comments;
        self
    }
}

/// Map a query capture name to a chunk kind
///
/// Capture names in the registry queries are the stable kind tags; anything
/// unrecognized degrades to BLOCK rather than being dropped.
pub fn kind_for_capture(capture_name: &str) -> ChunkKind {
    ChunkKind::from_tag(capture_name)
}

const SLASH_COMMENTS: CommentProfile = CommentProfile {
    line_prefixes: &["///", "//!", "//"],
    block_delimiters: Some(("/*", "*/")),
    string_docstrings: false,
};

const HASH_COMMENTS: CommentProfile = CommentProfile {
    line_prefixes: &["#"],
    block_delimiters: None,
    string_docstrings: false,
};

const PYTHON_COMMENTS: CommentProfile = CommentProfile {
    line_prefixes: &["#"],
    block_delimiters: None,
    string_docstrings: true,
};

lazy_static! {
    /// Registry of all supported language configurations
    pub static ref LANGUAGE_REGISTRY: HashMap<&'static str, LanguageConfig> = {
        let mut registry = HashMap::new();

        registry.insert(
            "rust",
            LanguageConfig::new("rust")
                .with_extensions(&["rs"])
                .with_tree_sitter(
                    tree_sitter_rust::LANGUAGE.into(),
                    r#"
                    (function_item) @function
                    (struct_item) @struct
                    (enum_item) @enum
                    (trait_item) @trait
                    (mod_item) @module
                    (type_item) @type_alias
                    (macro_definition) @macro
                    (const_item) @variable
                    (static_item) @variable
                    (line_comment) @comment
                    (block_comment) @comment
                    "#,
                )
                .with_containers(
                    &["mod_item", "impl_item", "trait_item"],
                    &["impl_item", "trait_item"],
                )
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "python",
            LanguageConfig::new("python")
                .with_extensions(&["py", "pyi"])
                .with_tree_sitter(
                    tree_sitter_python::LANGUAGE.into(),
                    r#"
                    (function_definition) @function
                    (class_definition) @class
                    (comment) @comment
                    "#,
                )
                .with_containers(
                    &["class_definition", "function_definition"],
                    &["class_definition"],
                )
                .with_comments(PYTHON_COMMENTS),
        );

        registry.insert(
            "javascript",
            LanguageConfig::new("javascript")
                .with_extensions(&["js", "mjs", "cjs", "jsx"])
                .with_tree_sitter(
                    tree_sitter_javascript::LANGUAGE.into(),
                    r#"
                    (function_declaration) @function
                    (generator_function_declaration) @function
                    (class_declaration) @class
                    (method_definition) @method
                    (comment) @comment
                    "#,
                )
                .with_containers(&["class_declaration"], &["class_declaration"])
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "typescript",
            LanguageConfig::new("typescript")
                .with_extensions(&["ts", "mts", "cts"])
                .with_tree_sitter(
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                    r#"
                    (function_declaration) @function
                    (class_declaration) @class
                    (method_definition) @method
                    (interface_declaration) @interface
                    (enum_declaration) @enum
                    (type_alias_declaration) @type_alias
                    (comment) @comment
                    "#,
                )
                .with_containers(
                    &["class_declaration", "interface_declaration"],
                    &["class_declaration", "interface_declaration"],
                )
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "tsx",
            LanguageConfig::new("tsx")
                .with_extensions(&["tsx"])
                .with_tree_sitter(
                    tree_sitter_typescript::LANGUAGE_TSX.into(),
                    r#"
                    (function_declaration) @function
                    (class_declaration) @class
                    (method_definition) @method
                    (interface_declaration) @interface
                    (comment) @comment
                    "#,
                )
                .with_containers(&["class_declaration"], &["class_declaration"])
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "java",
            LanguageConfig::new("java")
                .with_extensions(&["java"])
                .with_tree_sitter(
                    tree_sitter_java::LANGUAGE.into(),
                    r#"
                    (class_declaration) @class
                    (interface_declaration) @interface
                    (enum_declaration) @enum
                    (method_declaration) @method
                    (constructor_declaration) @method
                    (line_comment) @comment
                    (block_comment) @comment
                    "#,
                )
                .with_containers(
                    &["class_declaration", "interface_declaration", "enum_declaration"],
                    &["class_declaration", "interface_declaration", "enum_declaration"],
                )
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "csharp",
            LanguageConfig::new("csharp")
                .with_extensions(&["cs", "csx"])
                .with_tree_sitter(
                    tree_sitter_c_sharp::LANGUAGE.into(),
                    r#"
                    (class_declaration) @class
                    (interface_declaration) @interface
                    (struct_declaration) @struct
                    (enum_declaration) @enum
                    (method_declaration) @method
                    (constructor_declaration) @method
                    (namespace_declaration) @namespace
                    (comment) @comment
                    "#,
                )
                .with_containers(
                    &[
                        "namespace_declaration",
                        "class_declaration",
                        "interface_declaration",
                        "struct_declaration",
                    ],
                    &["class_declaration", "interface_declaration", "struct_declaration"],
                )
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "c",
            LanguageConfig::new("c")
                .with_extensions(&["c", "h"])
                .with_tree_sitter(
                    tree_sitter_c::LANGUAGE.into(),
                    r#"
                    (function_definition) @function
                    (struct_specifier) @struct
                    (enum_specifier) @enum
                    (type_definition) @type_alias
                    (comment) @comment
                    "#,
                )
                .with_containers(&[], &[])
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "cpp",
            LanguageConfig::new("cpp")
                .with_extensions(&["cpp", "cxx", "cc", "hpp", "hxx", "hh"])
                .with_tree_sitter(
                    tree_sitter_cpp::LANGUAGE.into(),
                    r#"
                    (function_definition) @function
                    (class_specifier) @class
                    (struct_specifier) @struct
                    (enum_specifier) @enum
                    (namespace_definition) @namespace
                    (comment) @comment
                    "#,
                )
                .with_containers(
                    &["namespace_definition", "class_specifier", "struct_specifier"],
                    &["class_specifier", "struct_specifier"],
                )
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "go",
            LanguageConfig::new("go")
                .with_extensions(&["go"])
                .with_tree_sitter(
                    tree_sitter_go::LANGUAGE.into(),
                    r#"
                    (function_declaration) @function
                    (method_declaration) @method
                    (type_declaration) @type_alias
                    (comment) @comment
                    "#,
                )
                .with_containers(&[], &[])
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "kotlin",
            LanguageConfig::new("kotlin")
                .with_extensions(&["kt", "kts"])
                .with_tree_sitter(
                    tree_sitter_kotlin_ng::LANGUAGE.into(),
                    r#"
                    (function_declaration) @function
                    (class_declaration) @class
                    (object_declaration) @class
                    "#,
                )
                .with_containers(
                    &["class_declaration", "object_declaration"],
                    &["class_declaration", "object_declaration"],
                )
                // Grammar has no stable named comment nodes; use the tree scan
                .with_comment_scan()
                .with_comments(SLASH_COMMENTS),
        );

        registry.insert(
            "bash",
            LanguageConfig::new("bash")
                .with_extensions(&["sh", "bash", "zsh"])
                .with_tree_sitter(
                    tree_sitter_bash::LANGUAGE.into(),
                    r#"
                    (function_definition) @function
                    (comment) @comment
                    "#,
                )
                .with_containers(&[], &[])
                .with_comments(HASH_COMMENTS),
        );

        // Text-adapter language: handled by the markdown module, no grammar
        registry.insert(
            "markdown",
            LanguageConfig::new("markdown").with_extensions(&["md", "markdown"]),
        );

        // Detect-only languages: recognized so skip diagnostics carry a
        // meaningful tag, but no extractor is registered for them
        registry.insert(
            "toml",
            LanguageConfig::new("toml")
                .with_extensions(&["toml"])
                .with_comments(HASH_COMMENTS),
        );
        registry.insert(
            "makefile",
            LanguageConfig::new("makefile")
                .with_extensions(&["mk"])
                .with_filenames(&["Makefile", "GNUmakefile", "makefile"])
                .with_comments(HASH_COMMENTS),
        );
        registry.insert(
            "matlab",
            LanguageConfig::new("matlab").with_extensions(&["m"]),
        );
        registry.insert(
            "groovy",
            LanguageConfig::new("groovy")
                .with_extensions(&["groovy", "gradle"])
                .with_comments(SLASH_COMMENTS),
        );

        registry
    };

    /// Map of file extensions to language IDs
    pub static ref EXTENSION_MAP: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        for (lang_id, config) in LANGUAGE_REGISTRY.iter() {
            for ext in config.extensions {
                map.insert(*ext, *lang_id);
            }
        }
        map
    };

    /// Map of exact filenames to language IDs
    pub static ref FILENAME_MAP: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        for (lang_id, config) in LANGUAGE_REGISTRY.iter() {
            for name in config.filenames {
                map.insert(*name, *lang_id);
            }
        }
        map
    };
}

/// Gets a language configuration by ID
pub fn get_language_config(language_id: &str) -> Option<&'static LanguageConfig> {
    LANGUAGE_REGISTRY.get(language_id)
}

/// Detect the language tag for a path: filename match first, then extension
/// map, then `"unknown"`.
pub fn detect_language(path: &std::path::Path) -> &'static str {
    if let Some(name) = path.file_name().and_then(|n| n.to_str())
        && let Some(lang) = FILENAME_MAP.get(name)
    {
        return lang;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| EXTENSION_MAP.get(ext).copied())
        .unwrap_or("unknown")
}

/// Whether an extractor exists for this language tag
///
/// Languages detected but not extractable (registry entries without a
/// grammar or text adapter) report false; callers record
/// `skipped(reason=unsupported)`.
pub fn is_supported(language_id: &str) -> bool {
    match LANGUAGE_REGISTRY.get(language_id) {
        Some(config) => config.tree_sitter_language.is_some() || config.id == "markdown",
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn registry_contains_core_languages() {
        for lang in [
            "rust",
            "python",
            "javascript",
            "typescript",
            "tsx",
            "java",
            "csharp",
            "c",
            "cpp",
            "go",
            "kotlin",
            "bash",
            "markdown",
        ] {
            assert!(
                LANGUAGE_REGISTRY.contains_key(lang),
                "Missing configuration for language: {lang}"
            );
        }
    }

    #[test]
    fn grammar_languages_have_queries() {
        for (lang, config) in LANGUAGE_REGISTRY.iter() {
            if config.tree_sitter_language.is_some() {
                assert!(config.query.is_some(), "Language {lang} has no query");
            }
        }
    }

    #[test]
    fn extension_detection() {
        assert_eq!(detect_language(Path::new("src/main.rs")), "rust");
        assert_eq!(detect_language(Path::new("a/x.py")), "python");
        assert_eq!(detect_language(Path::new("lib.ts")), "typescript");
        assert_eq!(detect_language(Path::new("App.tsx")), "tsx");
        assert_eq!(detect_language(Path::new("README.md")), "markdown");
        assert_eq!(detect_language(Path::new("photo.jpg")), "unknown");
    }

    #[test]
    fn filename_detection_precedes_extension() {
        assert_eq!(detect_language(Path::new("sub/Makefile")), "makefile");
        assert_eq!(detect_language(Path::new("GNUmakefile")), "makefile");
    }

    #[test]
    fn support_distinguishes_detect_only_languages() {
        assert!(is_supported("rust"));
        assert!(is_supported("markdown"));
        assert!(!is_supported("toml"));
        assert!(!is_supported("makefile"));
        assert!(!is_supported("unknown"));
    }

    #[test]
    fn capture_names_map_to_kinds() {
        assert_eq!(kind_for_capture("function"), ChunkKind::Function);
        assert_eq!(kind_for_capture("type_alias"), ChunkKind::TypeAlias);
        assert_eq!(kind_for_capture("mystery"), ChunkKind::Block);
    }

    #[test]
    fn extension_uniqueness() {
        // Each extension maps to exactly one language in the registry build;
        // a duplicate would silently shadow and break detection.
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (lang_id, config) in LANGUAGE_REGISTRY.iter() {
            for ext in config.extensions {
                if let Some(previous) = seen.insert(ext, lang_id) {
                    panic!("Extension '{ext}' maps to both {previous} and {lang_id}");
                }
            }
        }
    }
}
