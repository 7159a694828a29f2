//! Payload cleanup: chat wrappers, fences, EOL and zero-width noise.
//!
//! Turns a raw reply (often a unified diff wrapped in a ```diff fence, a
//! `BEGIN_PATCH` banner, or prose) into a clean diff text ending with exactly
//! one newline. Also hosts the unified-diff predicate reused by kind
//! detection.

use std::sync::LazyLock;

use regex::Regex;

static DIFF_GIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^diff --git ").expect("diff --git regex"));
static OLD_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--- ").expect("--- regex"));
static NEW_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\+\+\+ ").expect("+++ regex"));
static HUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^@@ -\d+(?:,\d+)? \+\d+(?:,\d+)? @@").expect("hunk header regex")
});

static FENCE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(`{3,}|~{3,})(.*)$").expect("fence regex"));
static BEGIN_BANNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*begin[ _-]*patch\s*$").expect("begin banner regex"));
static END_BANNER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*end[ _-]*patch\s*$").expect("end banner regex"));
static STAR_BEGIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\*\*\*\s*begin[ _-]*patch\s*$").expect("*** begin regex")
});
static STAR_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\*\*\*\s*end[ _-]*patch\s*$").expect("*** end regex")
});

const ZERO_WIDTH: [char; 4] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{FEFF}'];

/// True when `text` carries any unified-diff marker
pub fn looks_like_unified_diff(text: &str) -> bool {
    DIFF_GIT_RE.is_match(text)
        || (OLD_HEADER_RE.is_match(text) && NEW_HEADER_RE.is_match(text))
        || HUNK_RE.is_match(text)
}

/// CRLF and lone CR become LF
pub fn normalize_eol(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Drop U+200B..U+200D and BOM characters
pub fn strip_zero_width(s: &str) -> String {
    s.chars().filter(|c| !ZERO_WIDTH.contains(c)).collect()
}

/// Trim, normalize line endings, strip zero-width characters
fn basic_normalize(s: &str) -> String {
    strip_zero_width(&normalize_eol(s)).trim().to_string()
}

/// A fence delimiter line: (char, run length, info string)
fn parse_fence(line: &str) -> Option<(char, usize, &str)> {
    let caps = FENCE_OPEN_RE.captures(line)?;
    let run = caps.get(1)?.as_str();
    let ch = run.chars().next()?;
    let info = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    // A backtick fence's info string may not itself contain backticks
    if ch == '`' && info.contains('`') {
        return None;
    }
    Some((ch, run.len(), info))
}

/// Closing delimiter for an opener: same char, same length, nothing after
fn is_closing_fence(line: &str, ch: char, len: usize) -> bool {
    match parse_fence(line.trim_end()) {
        Some((c, n, info)) => c == ch && n == len && info.trim().is_empty(),
        None => false,
    }
}

/// Remove one outer wrapper when both first and last lines form a known pair
fn unwrap_outer(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 2 {
        return None;
    }
    let first = lines[0];
    let last = lines[lines.len() - 1];

    let wrapped = if let Some((ch, len, _)) = parse_fence(first) {
        is_closing_fence(last, ch, len)
    } else if STAR_BEGIN_RE.is_match(first) {
        STAR_END_RE.is_match(last)
    } else if BEGIN_BANNER_RE.is_match(first) {
        END_BANNER_RE.is_match(last)
    } else {
        false
    };

    if !wrapped {
        return None;
    }
    Some(lines[1..lines.len() - 1].join("\n"))
}

/// First fenced block whose body is a unified diff
fn extract_fenced_diff(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let Some((ch, len, _)) = parse_fence(lines[i]) else {
            i += 1;
            continue;
        };

        let close = (i + 1..lines.len()).find(|&j| is_closing_fence(lines[j], ch, len));
        match close {
            Some(j) => {
                let body = lines[i + 1..j].join("\n");
                if looks_like_unified_diff(&body) {
                    return Some(body);
                }
                i = j + 1;
            }
            None => i += 1,
        }
    }

    None
}

/// Everything from the first `diff --git` or `---`/`+++` header pair
fn extract_raw_diff(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().enumerate().position(|(i, l)| {
        l.starts_with("diff --git ")
            || (l.starts_with("--- ")
                && lines.get(i + 1).is_some_and(|n| n.starts_with("+++ ")))
    })?;

    let mut tail: Vec<&str> = lines[start..].to_vec();
    while tail.last().is_some_and(|l| l.trim().is_empty()) {
        tail.pop();
    }
    let trailing_fence = tail
        .last()
        .and_then(|l| parse_fence(l.trim_end()))
        .is_some_and(|(_, _, info)| info.trim().is_empty());
    if trailing_fence {
        tail.pop();
    }
    Some(tail.join("\n"))
}

/// Ensure exactly one trailing newline
fn with_single_newline(s: &str) -> String {
    let mut out = s.trim_end_matches('\n').to_string();
    out.push('\n');
    out
}

/// Clean a raw payload into diff text (see module docs).
///
/// When no embedded diff is found the normalized text is returned as is and
/// kind detection will reject it.
pub fn clean_patch_text(raw: &str) -> String {
    let mut text = basic_normalize(raw);

    if let Some(inner) = unwrap_outer(&text) {
        text = basic_normalize(&inner);
    }

    let extracted = extract_fenced_diff(&text).or_else(|| extract_raw_diff(&text));
    match extracted {
        Some(diff) => with_single_newline(&strip_zero_width(&normalize_eol(&diff))),
        None => with_single_newline(&text),
    }
}
