//! Line-oriented markdown adapter
//!
//! Markdown has no tree-sitter grammar in the registry; this adapter emits
//! HEADER, CODE_BLOCK, and PARAGRAPH chunks from a single line scan. Heading
//! nesting is tracked so chunks carry a qualified name like
//! `Guide::Install::Linux`.

use crate::chunk::{Chunk, ChunkKind};

const SYMBOL_MAX_CHARS: usize = 60;

/// Extract markdown chunks from decoded text
pub fn extract(text: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut heading_stack: Vec<(usize, String)> = Vec::new();

    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        // Fenced code block
        if let Some(fence) = fence_marker(trimmed) {
            let start = i;
            let info = trimmed.trim_start_matches(fence_char(fence)).trim();
            let mut end = i + 1;
            while end < lines.len() && fence_marker(lines[end].trim_start()) != Some(fence) {
                end += 1;
            }
            let close = end.min(lines.len().saturating_sub(1));
            let code = lines[start..=close.max(start)].join("\n");
            let symbol = if info.is_empty() {
                String::new()
            } else {
                truncate_symbol(info)
            };
            chunks.push(make_chunk(
                ChunkKind::CodeBlock,
                symbol,
                code,
                start + 1,
                close.max(start) + 1,
                &heading_stack,
            ));
            i = end + 1;
            continue;
        }

        // ATX heading
        if let Some((level, title)) = heading(trimmed) {
            heading_stack.retain(|(l, _)| *l < level);
            let symbol = truncate_symbol(&title);
            chunks.push(make_chunk(
                ChunkKind::Header,
                symbol,
                line.to_string(),
                i + 1,
                i + 1,
                &heading_stack,
            ));
            heading_stack.push((level, title));
            i += 1;
            continue;
        }

        // Paragraph: run of non-blank lines up to the next structural line
        if !trimmed.is_empty() {
            let start = i;
            let mut end = i;
            while end + 1 < lines.len() {
                let next = lines[end + 1].trim_start();
                if next.is_empty() || heading(next).is_some() || fence_marker(next).is_some() {
                    break;
                }
                end += 1;
            }
            let code = lines[start..=end].join("\n");
            let symbol = truncate_symbol(lines[start].trim());
            chunks.push(make_chunk(
                ChunkKind::Paragraph,
                symbol,
                code,
                start + 1,
                end + 1,
                &heading_stack,
            ));
            i = end + 1;
            continue;
        }

        i += 1;
    }

    chunks
}

fn make_chunk(
    kind: ChunkKind,
    symbol: String,
    code: String,
    start_line: usize,
    end_line: usize,
    heading_stack: &[(usize, String)],
) -> Chunk {
    let qualified_name = if heading_stack.is_empty() {
        None
    } else {
        let mut segments: Vec<&str> = heading_stack.iter().map(|(_, t)| t.as_str()).collect();
        if !symbol.is_empty() {
            segments.push(&symbol);
        }
        Some(segments.join("::"))
    };
    Chunk {
        kind,
        symbol,
        code,
        start_line,
        end_line,
        language: "markdown".to_string(),
        qualified_name,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fence {
    Backtick,
    Tilde,
}

const fn fence_char(fence: Fence) -> char {
    match fence {
        Fence::Backtick => '`',
        Fence::Tilde => '~',
    }
}

fn fence_marker(line: &str) -> Option<Fence> {
    if line.starts_with("```") {
        Some(Fence::Backtick)
    } else if line.starts_with("~~~") {
        Some(Fence::Tilde)
    } else {
        None
    }
}

fn heading(line: &str) -> Option<(usize, String)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim().to_string();
    Some((hashes, title))
}

fn truncate_symbol(text: &str) -> String {
    text.chars()
        .take(SYMBOL_MAX_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_carry_their_title() {
        let chunks = extract("# Guide\n\n## Install\n");
        let headers: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Header).collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].symbol, "Guide");
        assert_eq!(headers[1].symbol, "Install");
        assert_eq!(headers[1].qualified_name.as_deref(), Some("Guide::Install"));
    }

    #[test]
    fn fenced_code_block_spans_fences() {
        let text = "# T\n\n```rust\nfn x() {}\n```\n";
        let chunks = extract(text);
        let block = chunks.iter().find(|c| c.kind == ChunkKind::CodeBlock).unwrap();
        assert_eq!(block.symbol, "rust");
        assert_eq!(block.start_line, 3);
        assert_eq!(block.end_line, 5);
        assert!(block.code.contains("fn x() {}"));
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let text = "First paragraph line one.\nline two.\n\nSecond paragraph.\n";
        let chunks = extract(text);
        let paras: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Paragraph).collect();
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].start_line, 1);
        assert_eq!(paras[0].end_line, 2);
        assert_eq!(paras[1].start_line, 4);
    }

    #[test]
    fn heading_stack_resets_at_same_level() {
        let text = "# A\n\n## B\n\n## C\n";
        let chunks = extract(text);
        let c_header = chunks.iter().find(|c| c.symbol == "C").unwrap();
        assert_eq!(c_header.qualified_name.as_deref(), Some("A::C"));
    }

    #[test]
    fn unclosed_fence_extends_to_end() {
        let text = "```\ncode line\n";
        let chunks = extract(text);
        let block = chunks.iter().find(|c| c.kind == ChunkKind::CodeBlock).unwrap();
        assert_eq!(block.end_line, 2);
    }

    #[test]
    fn hash_in_code_block_is_not_a_heading() {
        let text = "```bash\n# not a heading\n```\n";
        let chunks = extract(text);
        assert!(chunks.iter().all(|c| c.kind != ChunkKind::Header));
    }
}
