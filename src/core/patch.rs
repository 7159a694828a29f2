//! Unified diff model, tolerant parser and hunk placement.
//!
//! The parser is lenient the way LLM output needs. Declared hunk counts
//! are honored while they last, so body lines such as `--- x` stay in the
//! hunk; once used up (or when they were wrong) the body runs until the
//! next non-body line. Blank lines inside a hunk are read as empty context
//! lines, and `index`/mode lines are skipped.
//! Placement compares lines modulo `\r` and trailing spaces/tabs and can
//! accept up to `fuzz` mismatching lines per hunk.

use std::sync::LazyLock;

use regex::Regex;

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@+ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

/// Literal old/new side name for file creation/deletion
pub const DEV_NULL: &str = "/dev/null";

/// A single hunk in a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize, // 1-based line number in old file
    pub old_count: usize, // Number of lines in old version (as declared)
    pub new_start: usize, // 1-based line number in new file
    pub new_count: usize, // Number of lines in new version (as declared)
    pub lines: Vec<HunkLine>,
    /// `\ No newline at end of file` followed an old-side line
    pub old_missing_newline: bool,
    /// `\ No newline at end of file` followed a new-side line
    pub new_missing_newline: bool,
}

/// A line in a hunk with its change type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String), // Unchanged line (starts with ' ')
    Remove(String),  // Removed line (starts with '-')
    Add(String),     // Added line (starts with '+')
}

impl Hunk {
    /// Lines the hunk expects to find in the old file
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
            HunkLine::Add(_) => None,
        })
    }

    pub fn old_len(&self) -> usize {
        self.old_lines().count()
    }

    /// Record a `\ No newline at end of file` marker against the last line
    fn mark_missing_newline(&mut self) {
        match self.lines.last() {
            Some(HunkLine::Context(_)) => {
                self.old_missing_newline = true;
                self.new_missing_newline = true;
            }
            Some(HunkLine::Remove(_)) => self.old_missing_newline = true,
            Some(HunkLine::Add(_)) => self.new_missing_newline = true,
            None => {}
        }
    }
}

/// A complete patch for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilePatch {
    /// Raw `---` side name (prefix intact, timestamp removed)
    pub old_name: Option<String>,
    /// Raw `+++` side name (prefix intact, timestamp removed)
    pub new_name: Option<String>,
    /// Every path named by the record's headers (`diff --git`, `---`/`+++`,
    /// rename/copy lines), raw, in order
    pub header_names: Vec<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn is_creation(&self) -> bool {
        self.old_name.as_deref() == Some(DEV_NULL)
    }

    pub fn is_deletion(&self) -> bool {
        self.new_name.as_deref() == Some(DEV_NULL)
    }

    /// Target name: new side unless it is `/dev/null`, else the old side
    pub fn target_name(&self) -> Option<&str> {
        fn usable(n: &Option<String>) -> Option<&str> {
            n.as_deref().filter(|s| !s.is_empty() && *s != DEV_NULL)
        }
        usable(&self.new_name).or_else(|| usable(&self.old_name))
    }

    fn is_empty(&self) -> bool {
        self.old_name.is_none() && self.new_name.is_none() && self.hunks.is_empty()
    }
}

/// Header name without the tab-separated timestamp some tools append
fn header_name(rest: &str) -> String {
    let name = rest.split('\t').next().unwrap_or(rest).trim_end();
    name.trim_matches('"').to_string()
}

/// `a/X b/Y` from a `diff --git` line (best effort, no quoting support)
fn git_header_names(rest: &str) -> (Option<String>, Option<String>) {
    if let Some(idx) = rest.find(" b/") {
        let (a, b) = rest.split_at(idx);
        return (Some(a.trim().to_string()), Some(b.trim().to_string()));
    }
    let mut parts = rest.split_whitespace();
    (parts.next().map(str::to_string), parts.next().map(str::to_string))
}

fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let caps = HUNK_HEADER_RE.captures(line)?;
    let num = |i: usize, default: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(default)
    };
    Some(Hunk {
        old_start: num(1, 0),
        old_count: num(2, 1),
        new_start: num(3, 0),
        new_count: num(4, 1),
        lines: Vec::new(),
        old_missing_newline: false,
        new_missing_newline: false,
    })
}

fn is_file_header_pair(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("--- ") && lines.get(i + 1).is_some_and(|n| n.starts_with("+++ "))
}

/// A `---`/`+++` pair directly followed by a hunk header
fn opens_file_section(lines: &[&str], i: usize) -> bool {
    lines.get(i + 2).is_some_and(|l| HUNK_HEADER_RE.is_match(l))
}

/// Header pair that starts a new record. While the open hunk still owes
/// lines, only a pair followed by `@@` counts; otherwise it is hunk body.
fn starts_record(lines: &[&str], i: usize, counted: bool) -> bool {
    is_file_header_pair(lines, i) && (!counted || opens_file_section(lines, i))
}

fn is_body_line(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('+') || line.starts_with('-') || line.starts_with('\\')
}

/// A blank line belongs to the hunk only if more hunk body follows it
fn blank_continues_hunk(lines: &[&str], i: usize, counted: bool) -> bool {
    let mut j = i + 1;
    while j < lines.len() {
        let l = lines[j];
        if l.is_empty() {
            j += 1;
            continue;
        }
        return is_body_line(l) && !starts_record(lines, j, counted);
    }
    false
}

/// Path named by a `rename from`/`copy to`-style extended header line
fn extended_header_name(line: &str) -> Option<&str> {
    ["rename from ", "rename to ", "copy from ", "copy to "]
        .iter()
        .find_map(|p| line.strip_prefix(p))
}

/// Parse a (cleaned) unified diff into per-file records. Never fails; a
/// garbage input yields an empty vector.
pub fn parse_unified_diff(text: &str) -> Vec<FilePatch> {
    let lines: Vec<&str> = text.lines().collect();
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut current = FilePatch::default();
    let mut hunk: Option<Hunk> = None;
    // Declared (old, new) lines the open hunk has not shown yet
    let mut owed = (0usize, 0usize);

    let flush_hunk = |current: &mut FilePatch, hunk: &mut Option<Hunk>| {
        if let Some(h) = hunk.take() {
            current.hunks.push(h);
        }
    };

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let counted = hunk.is_some() && (owed.0 > 0 || owed.1 > 0);

        if let Some(rest) = line.strip_prefix("diff --git ") {
            flush_hunk(&mut current, &mut hunk);
            if !current.is_empty() {
                patches.push(std::mem::take(&mut current));
            }
            let (a, b) = git_header_names(rest);
            current.header_names.extend(a.iter().chain(b.iter()).cloned());
            current.old_name = a;
            current.new_name = b;
            i += 1;
            continue;
        }

        if starts_record(&lines, i, counted) {
            flush_hunk(&mut current, &mut hunk);
            // A second header pair after hunks starts a new record
            if !current.hunks.is_empty() {
                patches.push(std::mem::take(&mut current));
            }
            let old = header_name(&line[4..]);
            let new = header_name(&lines[i + 1][4..]);
            current.header_names.push(old.clone());
            current.header_names.push(new.clone());
            current.old_name = Some(old);
            current.new_name = Some(new);
            i += 2;
            continue;
        }

        if let Some(h) = parse_hunk_header(line) {
            flush_hunk(&mut current, &mut hunk);
            owed = (h.old_count, h.new_count);
            hunk = Some(h);
            i += 1;
            continue;
        }

        if let Some(h) = hunk.as_mut() {
            if let Some(s) = line.strip_prefix(' ') {
                h.lines.push(HunkLine::Context(s.to_string()));
                owed = (owed.0.saturating_sub(1), owed.1.saturating_sub(1));
            } else if let Some(s) = line.strip_prefix('-') {
                h.lines.push(HunkLine::Remove(s.to_string()));
                owed.0 = owed.0.saturating_sub(1);
            } else if let Some(s) = line.strip_prefix('+') {
                h.lines.push(HunkLine::Add(s.to_string()));
                owed.1 = owed.1.saturating_sub(1);
            } else if line.starts_with('\\') {
                h.mark_missing_newline();
            } else if line.is_empty() && blank_continues_hunk(&lines, i, counted) {
                h.lines.push(HunkLine::Context(String::new()));
                owed = (owed.0.saturating_sub(1), owed.1.saturating_sub(1));
            } else {
                flush_hunk(&mut current, &mut hunk);
            }
        } else if let Some(name) = extended_header_name(line) {
            current.header_names.push(header_name(name));
        }
        // Anything else outside a hunk (index/mode lines, prose) is skipped
        i += 1;
    }

    flush_hunk(&mut current, &mut hunk);
    if !current.is_empty() {
        patches.push(current);
    }
    patches
}

/// Compare lines ignoring `\r` and trailing horizontal whitespace
pub fn lines_match(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.trim_end_matches(['\r', ' ', '\t']).to_string();
    let clean = |s: &str| strip(&s.replace('\r', ""));
    clean(a) == clean(b)
}

/// Why a hunk set could not be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaceError {
    #[error("hunk {index} could not be placed")]
    NoFit { index: usize },
    #[error("patch has no hunks")]
    NoHunks,
}

fn hunk_fits(lines: &[&str], hunk: &Hunk, pos: usize, fuzz: usize) -> bool {
    let mut errors = 0;
    for (k, expected) in hunk.old_lines().enumerate() {
        let Some(actual) = lines.get(pos + k) else {
            return false;
        };
        if !lines_match(actual, expected) {
            errors += 1;
            if errors > fuzz {
                return false;
            }
        }
    }
    true
}

/// Search outward from `expected` (alternating after/before) for a fit
fn locate_hunk(lines: &[&str], hunk: &Hunk, expected: usize, min: usize, fuzz: usize) -> Option<usize> {
    let old_len = hunk.old_len();
    if lines.len() < old_len + min {
        return None;
    }
    let max = lines.len() - old_len;
    let expected = expected.clamp(min, max);

    if hunk_fits(lines, hunk, expected, fuzz) {
        return Some(expected);
    }
    let span = (expected - min).max(max - expected);
    for d in 1..=span {
        let after = expected + d;
        if after <= max && hunk_fits(lines, hunk, after, fuzz) {
            return Some(after);
        }
        if let Some(before) = expected.checked_sub(d) {
            if before >= min && hunk_fits(lines, hunk, before, fuzz) {
                return Some(before);
            }
        }
    }
    None
}

/// Apply `hunks` to `original` (LF-only text) and return the new text.
///
/// Hunks are placed in order and never overlap. Context lines keep the
/// original file's text. The result keeps the original's trailing newline
/// state (an empty original gains one) unless the last hunk reaches the end
/// of the file and carries a `\ No newline at end of file` marker.
pub fn apply_hunks(original: &str, hunks: &[Hunk], fuzz: usize) -> Result<String, PlaceError> {
    if hunks.is_empty() {
        return Err(PlaceError::NoHunks);
    }

    let lines: Vec<&str> = original.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 16);
    let mut cursor = 0usize;
    let mut offset: isize = 0;

    for (index, hunk) in hunks.iter().enumerate() {
        // Pure insertions anchor after old_start; others at old_start - 1
        let declared = if hunk.old_len() == 0 {
            hunk.old_start
        } else {
            hunk.old_start.saturating_sub(1)
        };
        let expected = (declared as isize + offset).max(0) as usize;

        let pos = locate_hunk(&lines, hunk, expected, cursor, fuzz)
            .ok_or(PlaceError::NoFit { index })?;
        offset = pos as isize - declared as isize;

        out.extend(lines[cursor..pos].iter().map(|s| s.to_string()));
        let mut at = pos;
        for hl in &hunk.lines {
            match hl {
                HunkLine::Context(_) => {
                    out.push(lines[at].to_string());
                    at += 1;
                }
                HunkLine::Remove(_) => at += 1,
                HunkLine::Add(s) => out.push(s.clone()),
            }
        }
        cursor = at;
    }
    let at_eof = cursor == lines.len();
    out.extend(lines[cursor..].iter().map(|s| s.to_string()));

    if out.is_empty() {
        return Ok(String::new());
    }
    let trailing_newline = match hunks.last() {
        Some(last) if at_eof && last.new_missing_newline => false,
        Some(last) if at_eof && last.old_missing_newline => true,
        _ => original.is_empty() || original.ends_with('\n'),
    };
    let mut text = out.join("\n");
    if trailing_newline {
        text.push('\n');
    }
    Ok(text)
}
