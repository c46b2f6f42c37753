const SEPARATORS: &[char] = &[',', '，', '、', '\n', '\r'];

/// Splits a classifier answer such as `"비빔밥, 계란국"` into food names.
///
/// Segments are trimmed and blanks dropped. Order is kept and duplicates are
/// not removed: two bowls of rice in a photo are two entries.
pub fn split_and_clean(text: &str) -> Vec<String> {
    text.split(SEPARATORS)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}
