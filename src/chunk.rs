//! Recursive, overlap-preserving text chunker.
//!
//! Splits document text into segments no longer than `chunk_size`
//! characters, preferring the largest structural break available:
//! paragraph breaks first, then line breaks, sentence punctuation, spaces,
//! and finally raw characters. Adjacent segments share up to
//! `chunk_overlap` characters so context survives a split boundary.
//!
//! Splitting never drops text: every character of the input appears in the
//! emitted chunks, and the non-overlapping union of the chunks reconstructs
//! the original input.

use std::collections::VecDeque;

/// Separator priority, largest structural break first. The empty string is
/// the character-level fallback and always matches.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// `chunk_overlap` must be smaller than `chunk_size` (enforced by config
/// validation). Empty input produces no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    split_recursive(text, &SEPARATORS, chunk_size, &mut pieces);
    merge_pieces(pieces, chunk_size, chunk_overlap)
}

/// Break `text` into pieces each no longer than `chunk_size` characters,
/// using the first separator in `seps` that occurs in the text. Oversized
/// pieces are re-split with the remaining, finer separators.
fn split_recursive(text: &str, seps: &[&str], chunk_size: usize, out: &mut Vec<String>) {
    let (idx, sep) = seps
        .iter()
        .enumerate()
        .find(|(_, s)| s.is_empty() || text.contains(**s))
        .map(|(i, s)| (i, *s))
        .unwrap_or((seps.len() - 1, ""));

    if sep.is_empty() {
        for ch in text.chars() {
            out.push(ch.to_string());
        }
        return;
    }

    for piece in split_keeping_separator(text, sep) {
        if piece.chars().count() > chunk_size {
            split_recursive(&piece, &seps[idx + 1..], chunk_size, out);
        } else {
            out.push(piece);
        }
    }
}

/// Split on `sep`, keeping the separator attached to the preceding piece so
/// no characters are lost.
fn split_keeping_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(sep) {
        let end = pos + sep.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Greedily pack pieces into chunks of at most `chunk_size` characters.
/// When a chunk is emitted, a tail of at most `overlap` characters worth of
/// pieces is retained as the start of the next chunk.
fn merge_pieces(pieces: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(String, usize)> = VecDeque::new();
    let mut window_len = 0usize;

    for piece in pieces {
        let plen = piece.chars().count();
        if window_len + plen > chunk_size && !window.is_empty() {
            chunks.push(join_window(&window));
            while window_len > overlap || (window_len + plen > chunk_size && window_len > 0) {
                let (_, front_len) = window.pop_front().expect("window not empty");
                window_len -= front_len;
            }
        }
        window.push_back((piece, plen));
        window_len += plen;
    }

    if !window.is_empty() {
        chunks.push(join_window(&window));
    }
    chunks
}

fn join_window(window: &VecDeque<(String, usize)>) -> String {
    window.iter().map(|(s, _)| s.as_str()).collect()
}
