use crate::summarizer::sentences::split_sentences;

/// Cuts `text` into parts of at most `max_part_chars` characters along
/// sentence boundaries.
///
/// A single sentence longer than the limit becomes its own oversized part.
/// When more than `max_parts` parts come out, adjacent parts are greedily
/// re-merged up to `max_part_chars * merge_factor`.
pub fn split_for_distribution(
    text: &str,
    max_part_chars: usize,
    max_parts: usize,
    merge_factor: f32,
) -> Vec<String> {
    if text.chars().count() <= max_part_chars {
        return vec![text.to_string()];
    }

    let pieces = split_sentences(text);
    let parts = pack(pieces.iter().copied(), max_part_chars);

    if parts.len() <= max_parts {
        return parts;
    }

    let merged_limit = (max_part_chars as f32 * merge_factor) as usize;
    let merged = pack(parts.iter().map(String::as_str), merged_limit);
    tracing::debug!(
        "Re-merged {} parts into {} (limit {} chars)",
        parts.len(),
        merged.len(),
        merged_limit
    );
    merged
}

/// Greedy packing: a piece goes into the current part unless that would push
/// it over `limit` and the part already holds something.
fn pack<'a>(pieces: impl Iterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for piece in pieces {
        let piece_chars = piece.chars().count();
        if current_chars > 0 && current_chars + piece_chars > limit {
            parts.push(current.trim_end().to_string());
            current.clear();
            current_chars = 0;
        }
        current.push_str(piece);
        current.push(' ');
        current_chars += piece_chars + 1;
    }

    if current_chars > 0 {
        parts.push(current.trim_end().to_string());
    }

    parts
}
