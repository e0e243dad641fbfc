use std::sync::OnceLock;

use regex_lite::Regex;

use super::overlap::remove_overlap;

fn reasoning_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"(?i)</?think>").expect("reasoning tag pattern is valid"))
}

/// Clean raw model output for display after `input_text`.
///
/// 1. Removes every `<think>` / `</think>` marker (any case), keeping the text between them
/// 2. Trims surrounding whitespace
/// 3. Cuts the part of the completion that restates the end of the input
pub fn clean_completion(input_text: &str, raw_completion: &str) -> String {
    let completion = reasoning_tag().replace_all(raw_completion, "");
    remove_overlap(input_text, completion.trim())
}
