//! Overlap removal between user input and model continuation
//!
//! Models frequently restate the tail of the prompt before extending it.
//! The longest run of words that ends `input_text` and also starts the
//! completion (compared after [`normalize`]) is cut from the completion, and
//! the spacing in front of what remains is rebuilt.

use super::normalize::{is_word_char, normalize};

/// Return only the novel part of `completion`, formatted so that
/// `input_text + result` reads naturally.
///
/// ```
/// use drunkenbot_common::text::remove_overlap;
///
/// let rest = remove_overlap(
///     "My mind is the sky",
///     "My mind is the sky, everything else is the weather",
/// );
/// assert_eq!(rest, ", everything else is the weather");
/// ```
pub fn remove_overlap(input_text: &str, completion: &str) -> String {
    let input_words: Vec<&str> = input_text.split_whitespace().collect();
    let completion_words: Vec<&str> = completion.split_whitespace().collect();

    if input_words == completion_words {
        return String::new();
    }

    let overlap_length = longest_overlap(&input_words, &completion_words);
    if overlap_length == 0 {
        return completion.to_string();
    }

    let remaining = completion_words[overlap_length..].join(" ");
    let punctuation = trailing_punctuation(completion_words[overlap_length - 1]);

    if !punctuation.is_empty() {
        if remaining.is_empty() {
            return punctuation.to_string();
        }
        return format!("{punctuation} {remaining}");
    }

    if remaining.is_empty() || ends_with_whitespace(input_text) {
        remaining
    } else {
        format!(" {remaining}")
    }
}

/// Largest `i` such that the last `i` input words and the first `i`
/// completion words are equal once normalized.
fn longest_overlap(input_words: &[&str], completion_words: &[&str]) -> usize {
    let max = input_words.len().min(completion_words.len());
    let mut overlap_length = 0;

    for i in 1..=max {
        let input_end = normalize(&input_words[input_words.len() - i..].join(" "));
        let completion_start = normalize(&completion_words[..i].join(" "));

        if input_end == completion_start {
            overlap_length = i;
        }
    }

    overlap_length
}

/// Maximal trailing run of characters that are neither word characters nor whitespace.
fn trailing_punctuation(word: &str) -> &str {
    let start = word
        .char_indices()
        .rev()
        .take_while(|(_, c)| !is_word_char(*c) && !c.is_whitespace())
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(word.len());
    &word[start..]
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}
