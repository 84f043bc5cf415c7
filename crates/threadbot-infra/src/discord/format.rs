//! Message splitting for Discord's per-message length limit.

/// Maximum message length for Discord, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Split text into chunks of at most [`MAX_MESSAGE_LENGTH`] characters.
///
/// Prefers line boundaries, then the last space, then a hard cut. Never
/// splits inside a UTF-8 sequence; concatenating the chunks yields the input.
pub fn split_message(text: &str) -> Vec<String> {
    split_message_at(text, MAX_MESSAGE_LENGTH)
}

fn split_message_at(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_chars {
            let mut rest = line;
            while rest.chars().count() > max_chars {
                let at = find_split_point(rest, max_chars);
                chunks.push(rest[..at].to_string());
                rest = &rest[at..];
            }
            current.push_str(rest);
            current_len = rest.chars().count();
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Byte index to cut `text` at so the head holds at most `max_chars` chars.
fn find_split_point(text: &str, max_chars: usize) -> usize {
    let limit = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(i, _)| i);

    match text[..limit].rfind(' ') {
        Some(i) if i > 0 => i + 1,
        _ => limit,
    }
}
