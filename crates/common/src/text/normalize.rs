/// Lowercase `text` and drop every character that is not alphanumeric,
/// an underscore, or whitespace. Whitespace is left untouched.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| is_word_char(*c) || c.is_whitespace())
        .collect()
}

/// Word characters: Unicode alphanumerics plus underscore.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
