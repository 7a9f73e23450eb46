//! Oversize chunk splitting
//!
//! Any single chunk whose code exceeds the character ceiling is split at the
//! nearest safe boundary (blank line, then line end, then hard character cut)
//! into consecutive sub-chunks that share the same kind and qualified name,
//! with a `#partN` suffix on the symbol. Oversized chunks corrupt column
//! statistics in the backing store, so the ceiling is mandatory.

use crate::chunk::Chunk;

/// Character ceiling for a single chunk's code text
pub const MAX_CHUNK_CHARS: usize = 20_000;

// A boundary found too close to the window start would yield degenerate
// slivers; require at least a quarter of the window as progress.
const MIN_PROGRESS_DIVISOR: usize = 4;

/// Split a chunk into ceiling-bounded parts, or return it unchanged
pub fn split_oversize(chunk: Chunk, ceiling: usize) -> Vec<Chunk> {
    if chunk.code.chars().count() <= ceiling {
        return vec![chunk];
    }

    let base_symbol = chunk.symbol.clone();
    let mut parts = Vec::new();
    let mut remaining = chunk.code.as_str();
    let mut line = chunk.start_line;
    let mut part_number = 1usize;

    while !remaining.is_empty() {
        let cut = if remaining.chars().count() <= ceiling {
            remaining.len()
        } else {
            find_cut(remaining, ceiling)
        };

        let (part_text, rest) = remaining.split_at(cut);
        let newlines = part_text.matches('\n').count();
        let trailing = usize::from(part_text.ends_with('\n'));
        let end_line = line + newlines.saturating_sub(trailing);

        parts.push(Chunk {
            kind: chunk.kind,
            symbol: format!("{base_symbol}#part{part_number}"),
            code: part_text.to_string(),
            start_line: line,
            end_line,
            language: chunk.language.clone(),
            qualified_name: chunk.qualified_name.clone(),
        });

        line += newlines;
        part_number += 1;
        remaining = rest;
    }

    parts
}

/// Byte offset of the best cut point within the first `ceiling` characters
fn find_cut(text: &str, ceiling: usize) -> usize {
    let window_end = text
        .char_indices()
        .nth(ceiling)
        .map_or(text.len(), |(idx, _)| idx);
    let window = &text[..window_end];
    let min_progress = ceiling / MIN_PROGRESS_DIVISOR;

    // Prefer a blank line, cutting after it
    if let Some(idx) = window.rfind("\n\n") {
        let cut = idx + 2;
        if cut > min_progress {
            return cut;
        }
    }

    // Then any line end
    if let Some(idx) = window.rfind('\n') {
        let cut = idx + 1;
        if cut > min_progress {
            return cut;
        }
    }

    // Hard character cut
    window_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKind;

    fn big_chunk(code: String) -> Chunk {
        Chunk {
            kind: ChunkKind::Function,
            symbol: "huge".to_string(),
            code,
            start_line: 10,
            end_line: 10,
            language: "rust".to_string(),
            qualified_name: Some("outer::huge".to_string()),
        }
    }

    #[test]
    fn small_chunk_is_untouched() {
        let chunk = big_chunk("fn tiny() {}".to_string());
        let parts = split_oversize(chunk.clone(), 100);
        assert_eq!(parts, vec![chunk]);
    }

    #[test]
    fn parts_carry_suffix_and_shared_identity() {
        let code = format!("{}\n\n{}", "a".repeat(80), "b".repeat(80));
        let parts = split_oversize(big_chunk(code), 100);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].symbol, "huge#part1");
        assert_eq!(parts[1].symbol, "huge#part2");
        for part in &parts {
            assert_eq!(part.kind, ChunkKind::Function);
            assert_eq!(part.qualified_name.as_deref(), Some("outer::huge"));
        }
    }

    #[test]
    fn prefers_blank_line_boundary() {
        let code = format!("{}\n\n{}", "x".repeat(60), "y".repeat(60));
        let parts = split_oversize(big_chunk(code), 100);
        assert!(parts[0].code.ends_with("\n\n"));
        assert!(parts[1].code.starts_with('y'));
    }

    #[test]
    fn falls_back_to_line_boundary() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {i} {}", "z".repeat(20))).collect();
        let code = lines.join("\n");
        let parts = split_oversize(big_chunk(code), 100);
        assert!(parts.len() > 1);
        assert!(parts[0].code.ends_with('\n'));
    }

    #[test]
    fn hard_cut_when_no_newlines() {
        let code = "q".repeat(250);
        let parts = split_oversize(big_chunk(code), 100);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].code.chars().count(), 100);
        assert_eq!(parts[2].code.chars().count(), 50);
    }

    #[test]
    fn reassembled_parts_equal_original() {
        let code: String = (0..50)
            .map(|i| format!("statement number {i};\n"))
            .collect();
        let original = big_chunk(code.clone());
        let parts = split_oversize(original, 200);
        let reassembled: String = parts.iter().map(|p| p.code.as_str()).collect();
        assert_eq!(reassembled, code);
    }

    #[test]
    fn line_numbers_are_continuous() {
        let code: String = (0..40).map(|i| format!("l{i}\n")).collect();
        let parts = split_oversize(big_chunk(code), 60);
        assert_eq!(parts[0].start_line, 10);
        for pair in parts.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
    }

    #[test]
    fn multibyte_text_cuts_on_char_boundaries() {
        let code = "é".repeat(150);
        let parts = split_oversize(big_chunk(code), 100);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].code.chars().count(), 100);
        assert_eq!(parts[1].code.chars().count(), 50);
    }
}
