//! Speech text
//!
//! Assistant replies are written for a chat window. Before they are handed to
//! the text-to-speech collaborator the markdown is stripped so the voice does
//! not read out asterisks and link targets.

use std::sync::LazyLock;

use regex::Regex;

/// Compile a built-in pattern
fn pattern(name: &str, source: &str) -> Regex {
    Regex::new(source).unwrap_or_else(|err| panic!("invalid {name} regex: {err}"))
}

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| pattern("CODE_FENCE", r"(?s)```.*?(```|$)"));
static LINK: LazyLock<Regex> = LazyLock::new(|| pattern("LINK", r"!?\[([^\]]*)\]\([^)]*\)"));
static HEADER: LazyLock<Regex> = LazyLock::new(|| pattern("HEADER", r"(?m)^[ \t]*#{1,6}[ \t]+"));
static BLOCKQUOTE: LazyLock<Regex> =
    LazyLock::new(|| pattern("BLOCKQUOTE", r"(?m)^[ \t]*>[ \t]?"));
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    pattern("LIST_MARKER", r"(?m)^[ \t]*(?:[-*+•]|\d{1,3}[.)])[ \t]+")
});
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| pattern("EMPHASIS", r"\*+|~~|`+|(?:^|\b)__|__(?:\b|$)"));
static PICTOGRAPH: LazyLock<Regex> = LazyLock::new(|| {
    pattern("PICTOGRAPH", r"[\p{Extended_Pictographic}\x{FE0F}\x{200D}]")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| pattern("WHITESPACE", r"\s+"));

/// Plain text suitable for text-to-speech
pub fn sanitize_for_speech(text: &str) -> String {
    let text = CODE_FENCE.replace_all(text, " ");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADER.replace_all(&text, "");
    let text = BLOCKQUOTE.replace_all(&text, "");
    let text = LIST_MARKER.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    let text = PICTOGRAPH.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
