//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s that respect a
//! configurable `max_tokens` limit. Splitting occurs on paragraph
//! boundaries (`\n\n`); oversized paragraphs are hard-split at the nearest
//! newline or space. Chunks are numbered from 1 so that the context window
//! arithmetic (`n - 4 ..= n + 3`, floored at 1) lines up with storage.

use sha2::{Digest, Sha256};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// One chunk of a file, ready to be embedded and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_number: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Split `text` into chunks numbered contiguously from 1.
/// Blank input produces no chunks.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                pieces.push(std::mem::take(&mut current_buf));
            }
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(i as i64 + 1, text))
        .collect()
}

fn hard_split(mut remaining: &str, max_chars: usize, out: &mut Vec<String>) {
    while !remaining.is_empty() {
        let mut split_at = remaining.len().min(max_chars);
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let actual_split = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|pos| pos + 1)
                .filter(|&pos| pos > 0)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        // A multi-byte first char wider than max_chars still has to advance.
        let actual_split = if actual_split == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            actual_split
        };
        let piece = remaining[..actual_split].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[actual_split..];
    }
}

fn make_chunk(chunk_number: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_number,
        text,
        hash,
    }
}
