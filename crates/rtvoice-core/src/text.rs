//! UTF-8 safe truncation for log previews of transcripts.

/// Truncate `s` to at most `max_bytes` bytes at a char boundary.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Single-line preview: newlines flattened, truncated with `…` when longer
/// than `max_bytes`.
pub fn preview(s: &str, max_bytes: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if flat.len() <= max_bytes {
        return flat;
    }
    format!("{}…", truncate_str(&flat, max_bytes))
}
