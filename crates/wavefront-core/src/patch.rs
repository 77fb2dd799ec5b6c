//! Unified-diff parsing and application.
//!
//! A patch blob may contain multiple file sections. Preamble lines
//! (`diff --git`, `index`, `---`/`+++`) are ignored except to extract the
//! target path. Hunks are applied at their recorded line offsets and every
//! context or removal line is verified against the original content; a
//! mismatch is an error, never a best-effort splice.

use crate::error::{Result, WavefrontError};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HunkLine {
    Context(String),
    Add(String),
    Remove(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<HunkLine>,
}

/// All hunks targeting one file.
#[derive(Debug, Clone, Serialize)]
pub struct FilePatch {
    pub path: String,
    pub hunks: Vec<Hunk>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a unified-diff blob into one structured patch per file.
pub fn parse(input: &str) -> Result<Vec<FilePatch>> {
    let lines: Vec<&str> = input.lines().collect();
    let mut patches: Vec<FilePatch> = Vec::new();
    let mut current: Option<FilePatch> = None;
    let mut old_path: Option<String> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("diff --git") {
            if let Some(fp) = current.take() {
                patches.push(fp);
            }
            old_path = None;
            i += 1;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            old_path = Some(strip_prefix_marker(rest.trim_end()));
            i += 1;
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            let target = rest.trim_end();
            let path = if target == "/dev/null" {
                old_path.clone().ok_or_else(|| WavefrontError::PatchParse {
                    line: i + 1,
                    message: "deletion section without a source path".into(),
                })?
            } else {
                strip_prefix_marker(target)
            };
            if current.as_ref().is_some_and(|fp| !fp.hunks.is_empty()) {
                patches.push(current.take().unwrap());
            }
            current = Some(FilePatch {
                path,
                hunks: Vec::new(),
            });
            i += 1;
        } else if line.starts_with("@@") {
            let fp = current.as_mut().ok_or_else(|| WavefrontError::PatchParse {
                line: i + 1,
                message: "hunk before any file header".into(),
            })?;
            let (hunk, consumed) = parse_hunk(&lines, i)?;
            fp.hunks.push(hunk);
            i += consumed;
        } else {
            // index lines, mode lines, commit preamble: not part of the contract
            i += 1;
        }
    }

    if let Some(fp) = current.take() {
        patches.push(fp);
    }
    Ok(patches)
}

/// Strip the conventional `a/` / `b/` prefix from a diff path marker.
fn strip_prefix_marker(path: &str) -> String {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

/// Parse one hunk starting at `start` (the `@@` header line). Returns the
/// hunk and the total number of lines consumed, header included. The body is
/// consumed by count, so `-`/`+` content lines are never confused with file
/// markers.
fn parse_hunk(lines: &[&str], start: usize) -> Result<(Hunk, usize)> {
    let header = lines[start];
    let (old_start, old_count, new_start, new_count) = parse_hunk_header(header, start + 1)?;

    let mut body = Vec::new();
    let mut old_seen = 0usize;
    let mut new_seen = 0usize;
    let mut i = start + 1;

    while old_seen < old_count || new_seen < new_count {
        let line = *lines.get(i).ok_or_else(|| WavefrontError::PatchParse {
            line: start + 1,
            message: format!(
                "truncated hunk: expected {old_count} source and {new_count} target lines"
            ),
        })?;
        i += 1;

        if line.starts_with('\\') {
            // "\ No newline at end of file" is metadata, not content
            continue;
        }
        match line.chars().next() {
            Some('+') => {
                body.push(HunkLine::Add(line[1..].to_string()));
                new_seen += 1;
            }
            Some('-') => {
                body.push(HunkLine::Remove(line[1..].to_string()));
                old_seen += 1;
            }
            Some(' ') => {
                body.push(HunkLine::Context(line[1..].to_string()));
                old_seen += 1;
                new_seen += 1;
            }
            None => {
                // Some tools emit fully empty context lines.
                body.push(HunkLine::Context(String::new()));
                old_seen += 1;
                new_seen += 1;
            }
            Some(c) => {
                return Err(WavefrontError::PatchParse {
                    line: i,
                    message: format!("unexpected hunk line prefix {c:?}"),
                });
            }
        }
    }

    Ok((
        Hunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines: body,
        },
        i - start,
    ))
}

/// Parse `@@ -a,b +c,d @@` (counts default to 1 when omitted).
fn parse_hunk_header(line: &str, line_no: usize) -> Result<(usize, usize, usize, usize)> {
    let malformed = || WavefrontError::PatchParse {
        line: line_no,
        message: format!("malformed hunk header {line:?}"),
    };
    let rest = line.strip_prefix("@@ -").ok_or_else(malformed)?;
    let end = rest.find(" @@").ok_or_else(malformed)?;
    let (old_part, new_part) = rest[..end].split_once(" +").ok_or_else(malformed)?;

    let range = |part: &str| -> Result<(usize, usize)> {
        let (start, count) = match part.split_once(',') {
            Some((s, c)) => (s, Some(c)),
            None => (part, None),
        };
        let start = start.parse().map_err(|_| malformed())?;
        let count = match count {
            Some(c) => c.parse().map_err(|_| malformed())?,
            None => 1,
        };
        Ok((start, count))
    };

    let (old_start, old_count) = range(old_part)?;
    let (new_start, new_count) = range(new_part)?;
    Ok((old_start, old_count, new_start, new_count))
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply every hunk of `fp` to `original`, in order, at the recorded offsets.
/// Context and removal lines must match the original exactly.
pub fn apply(original: &str, fp: &FilePatch) -> Result<String> {
    let had_newline = original.ends_with('\n');
    let old_lines: Vec<&str> = if original.is_empty() {
        Vec::new()
    } else {
        let mut v: Vec<&str> = original.split('\n').collect();
        if had_newline {
            v.pop();
        }
        v
    };

    let mismatch = |line: usize, expected: &str, found: &str| WavefrontError::HunkMismatch {
        path: fp.path.clone(),
        line,
        expected: expected.to_string(),
        found: found.to_string(),
    };

    let mut out: Vec<String> = Vec::new();
    let mut cursor = 0usize;

    for hunk in &fp.hunks {
        let start = hunk.old_start.saturating_sub(1);
        if start < cursor {
            return Err(mismatch(cursor + 1, "non-overlapping hunk", "overlapping hunk"));
        }
        if start > old_lines.len() {
            return Err(mismatch(hunk.old_start, "line within file", "end of file"));
        }
        out.extend(old_lines[cursor..start].iter().map(|s| s.to_string()));
        cursor = start;

        for hl in &hunk.lines {
            match hl {
                HunkLine::Add(text) => out.push(text.clone()),
                HunkLine::Context(expected) | HunkLine::Remove(expected) => {
                    let found = old_lines
                        .get(cursor)
                        .ok_or_else(|| mismatch(cursor + 1, expected, "end of file"))?;
                    if found != expected {
                        return Err(mismatch(cursor + 1, expected, found));
                    }
                    if matches!(hl, HunkLine::Context(_)) {
                        out.push(expected.clone());
                    }
                    cursor += 1;
                }
            }
        }
    }

    out.extend(old_lines[cursor..].iter().map(|s| s.to_string()));

    let mut text = out.join("\n");
    if !text.is_empty() && (had_newline || original.is_empty()) {
        text.push('\n');
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
