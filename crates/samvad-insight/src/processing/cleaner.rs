//! Text normalization applied before emotion scoring.

use std::sync::LazyLock;

// Word characters, whitespace, basic punctuation and the Cyrillic range of
// the corpus survive; everything else (emoji, markup leftovers) is removed.
static DISALLOWED_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[^\w\s.,!?а-яА-ЯёЁ]").expect("disallowed-char regex is valid")
});
static WHITESPACE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Strip disallowed characters, collapse whitespace runs to single spaces
/// and trim. Fully-stripped input yields an empty string.
///
/// Pure and deterministic; safe to call from worker threads.
pub fn clean_text(text: &str) -> String {
    let stripped = DISALLOWED_RE.replace_all(text, "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_cyrillic_and_basic_punctuation() {
        assert_eq!(
            clean_text("Срочно нужен результат!"),
            "Срочно нужен результат!"
        );
        assert_eq!(clean_text("Как дела, Ирина?"), "Как дела, Ирина?");
    }

    #[test]
    fn strips_emoji_and_symbols() {
        assert_eq!(clean_text("Спасибо 😊 за помощь ★"), "Спасибо за помощь");
        assert_eq!(clean_text("100% готово"), "100 готово");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(clean_text("  привет \n\t мир  "), "привет мир");
    }

    #[test]
    fn fully_stripped_input_is_empty() {
        assert_eq!(clean_text("★☆✦"), "");
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   "), "");
    }
}
