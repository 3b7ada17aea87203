//! Shared token counting: comments and string contents are stripped first so
//! `stub_score`/`impl_gini` measure actual implementation weight rather than
//! documentation or string literal length (spec §4.2).

/// Strip `//`, `#`, `/* */` comments and collapse string/char literal bodies
/// to a single placeholder token, then split on non-identifier boundaries.
pub fn strip_and_tokenize(src: &str) -> Vec<String> {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut string_delim: Option<char> = None;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push('\n');
            }
            continue;
        }
        if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
            }
            continue;
        }
        if let Some(delim) = string_delim {
            if c == '\\' {
                chars.next();
                continue;
            }
            if c == delim {
                string_delim = None;
                out.push_str(" STR ");
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                string_delim = Some(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                in_line_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                in_block_comment = true;
            }
            '#' if string_delim.is_none() => {
                in_line_comment = true;
            }
            _ => out.push(c),
        }
    }

    out.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn token_count(src: &str) -> usize {
    strip_and_tokenize(src).len()
}
