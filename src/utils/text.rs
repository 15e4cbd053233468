//! Text helpers for model output handling.

/// Shorten `content` to at most `max_bytes` (plus a marker), keeping the head
/// and the tail and cutting only on UTF-8 boundaries.
pub fn truncate_middle(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    if max_bytes == 0 {
        return format!("... [{} bytes truncated] ...", content.len());
    }

    let half = max_bytes / 2;

    let mut head_end = half.min(content.len());
    while !content.is_char_boundary(head_end) {
        head_end -= 1;
    }

    let mut tail_start = content.len().saturating_sub(half).max(head_end);
    while !content.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    let dropped = tail_start - head_end;
    format!(
        "{} ... [{} bytes truncated] ... {}",
        &content[..head_end],
        dropped,
        &content[tail_start..]
    )
}

/// Find the first balanced `{...}` object in `text`, honouring string
/// literals so braces inside quoted values do not end the object early.
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
