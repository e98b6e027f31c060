//! Text normalization shared by every matcher

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Case-fold, strip diacritics, turn punctuation into spaces and collapse
/// whitespace. `"  Mbare,  HARARÉ! "` becomes `"mbare harare"`.
pub fn normalize(raw: &str) -> String {
    let stripped: String = raw.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let mut out = String::with_capacity(stripped.len());
    for word in stripped
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Split normalized text into words
pub fn words(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

/// Word index where `phrase` starts inside `haystack`, both given as word
/// lists. With `plural_tolerant`, the phrase's last word also matches a
/// haystack word with a trailing "s" or "es".
pub fn find_phrase(haystack: &[&str], phrase: &[&str], plural_tolerant: bool) -> Option<usize> {
    if phrase.is_empty() || phrase.len() > haystack.len() {
        return None;
    }
    let last = phrase.len() - 1;
    (0..=haystack.len() - phrase.len()).find(|&start| {
        phrase.iter().enumerate().all(|(i, word)| {
            let candidate = haystack[start + i];
            candidate == *word
                || (plural_tolerant
                    && i == last
                    && (candidate.strip_suffix('s') == Some(word)
                        || candidate.strip_suffix("es") == Some(word)))
        })
    })
}

/// First word of normalized text, or "" when empty
pub fn first_word(normalized: &str) -> &str {
    normalized.split(' ').next().unwrap_or_default()
}

/// Title-case each whitespace-separated word, keeping the original spacing
/// collapsed to single spaces.
pub fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_accents_and_punctuation() {
        assert_eq!(normalize("  Mbare,  HARARÉ! "), "mbare harare");
        assert_eq!(normalize("Borrowdale-Brooke"), "borrowdale brooke");
        assert_eq!(normalize("...!!"), "");
    }

    #[test]
    fn find_phrase_respects_word_boundaries() {
        let hay = words("i need plumbers in harare");
        assert_eq!(find_phrase(&hay, &["plumber"], true), Some(2));
        assert_eq!(find_phrase(&hay, &["plumber"], false), None);
        assert_eq!(find_phrase(&hay, &["in", "harare"], false), Some(3));
        // "ios" must not match inside "curious"
        let hay = words("just curious");
        assert_eq!(find_phrase(&hay, &["ios"], true), None);
    }

    #[test]
    fn title_case_collapses_spacing() {
        assert_eq!(title_case("  tendai   MOYO "), "Tendai Moyo");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn first_word_of_empty_is_empty() {
        assert_eq!(first_word(""), "");
        assert_eq!(first_word("accept please"), "accept");
    }
}
