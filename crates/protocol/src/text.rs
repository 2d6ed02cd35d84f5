//! Sanitization for player-supplied text (display names and chat).

/// Strip markup and control characters, collapse surrounding whitespace and
/// truncate to at most `max_chars` characters.
///
/// Anything between `<` and the next `>` is removed together with the
/// brackets; a stray `<` without a closing bracket drops the rest of the
/// input. Remaining `&`, `"` and `'` are dropped.
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars * 4));
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            '&' | '"' | '\'' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.trim().chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Sanitize a display name, falling back to `Anonymous` when nothing is left.
pub fn sanitize_name(input: &str, max_chars: usize) -> String {
    let name = sanitize(input, max_chars);
    if name.is_empty() {
        "Anonymous".to_string()
    } else {
        name
    }
}
