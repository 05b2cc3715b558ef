/// Output Normalizer - Whitespace-Canonical Comparison
///
/// Applied identically to expected and actual output on the submit path only.
/// The run path always returns stdout verbatim.
///
/// **Normalization Rules:**
/// - Trim leading and trailing whitespace of the whole text
/// - Treat `\r\n` and `\n` alike
/// - Drop empty lines
/// - Collapse runs of spaces and tabs inside a line to one space
/// - Rejoin with a single `\n`
///
/// **Preserves:**
/// - Case sensitivity
/// - Line order
/// - Token boundaries (`"1 2"` never matches `"12"`)

/// Canonical form of `text`. `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn outputs_match(expected: &str, actual: &str) -> bool {
    normalize(expected) == normalize(actual)
}
