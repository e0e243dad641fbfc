//! Lyric cleanup before chunking

use regex_lite::Regex;
use std::sync::OnceLock;

fn annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.*?\]").expect("static pattern"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n").expect("static pattern"))
}

/// Strip section annotations (`[Chorus]`, `[Verse 1: Artist]`), collapse
/// blank lines and trim.
///
/// Returns an empty string when nothing but annotations and whitespace remain.
pub fn clean_lyrics(raw: &str) -> String {
    let without_annotations = annotation_re().replace_all(raw, "");
    let collapsed = blank_lines_re().replace_all(&without_annotations, "\n");
    collapsed.trim().to_string()
}

/// Replace every whitespace character with `-`
pub fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}
