//! Character-offset helpers. All offsets exchanged with the host count
//! Unicode scalar values, never bytes.

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}

/// `text[start..end]` in characters, clamped to the string.
pub fn char_slice(text: &str, start: usize, end: usize) -> &str {
    if start >= end {
        return "";
    }
    let begin = byte_offset(text, start);
    let finish = byte_offset(text, end);
    &text[begin..finish.max(begin)]
}

pub fn truncate_chars(text: &str, max: usize) -> &str {
    &text[..byte_offset(text, max)]
}
