use wana_kana::IsJapaneseChar;

pub const SENTENCE_TERMINATOR: char = '。';

pub const PREVIEW_SHORT: usize = 200;
pub const PREVIEW_MEDIUM: usize = 500;
pub const PREVIEW_LONG: usize = 1000;

// CJK Unified Ideographs Extension A; wana_kana only covers U+4E00..=U+9FAF
const EXTENSION_A: std::ops::RangeInclusive<char> = '\u{3400}'..='\u{4DBF}';

pub fn is_ideographic(c: char) -> bool {
    c.is_kanji() || EXTENSION_A.contains(&c)
}

pub trait JapaneseText {
    fn has_kanji(&self) -> bool;

    /// Empty text passes; otherwise trailing whitespace is ignored.
    fn ends_with_terminator(&self) -> bool;
}

impl JapaneseText for str {
    fn has_kanji(&self) -> bool {
        self.chars().any(is_ideographic)
    }

    fn ends_with_terminator(&self) -> bool {
        self.is_empty() || self.trim_end().ends_with(SENTENCE_TERMINATOR)
    }
}

impl JapaneseText for String {
    fn has_kanji(&self) -> bool {
        self.as_str().has_kanji()
    }

    fn ends_with_terminator(&self) -> bool {
        self.as_str().ends_with_terminator()
    }
}

/// First `max_chars` characters, for log lines.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
