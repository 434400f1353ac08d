//! Head/tail content truncation with UTF-8-safe boundaries and resumable
//! offsets, used to keep tool output and file reads within the caller's
//! context budget.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const DEFAULT_MAX_BYTES: usize = 50 * 1024;
pub const DEFAULT_MAX_LINES: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncatedBy {
    Lines,
    Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationResult {
    pub content: String,
    pub truncated: bool,
    pub truncated_by: Option<TruncatedBy>,
    pub total_lines: usize,
    pub output_lines: usize,
    pub total_bytes: usize,
    pub output_bytes: usize,
    #[serde(default)]
    pub first_line_exceeds_limit: bool,
    #[serde(default)]
    pub last_line_partial: bool,
    #[serde(default)]
    pub next_offset: usize,
}

impl TruncationResult {
    fn untruncated(content: &str) -> Self {
        let total_lines = content.split('\n').count();
        let total_bytes = content.len();
        Self {
            content: content.to_string(),
            truncated: false,
            truncated_by: None,
            total_lines,
            output_lines: total_lines,
            total_bytes,
            output_bytes: total_bytes,
            first_line_exceeds_limit: false,
            last_line_partial: false,
            next_offset: 0,
        }
    }

    /// Human-readable continuation hint, matching the original's two message
    /// shapes (line-limited vs byte-limited), in either head or tail mode.
    pub fn format_message(&self, mode: TruncateMode) -> String {
        if !self.truncated {
            return String::new();
        }
        match (mode, self.truncated_by) {
            (TruncateMode::Head, Some(TruncatedBy::Lines)) => format!(
                "\n\n[Showing lines 1-{} of {}. Use offset={} to continue.]",
                self.output_lines, self.total_lines, self.next_offset
            ),
            (TruncateMode::Head, Some(TruncatedBy::Bytes)) => format!(
                "\n\n[Showing {}KB of {}KB. Use offset={} to continue.]",
                self.output_bytes / 1024,
                self.total_bytes / 1024,
                self.next_offset
            ),
            (TruncateMode::Tail, Some(TruncatedBy::Lines)) => format!(
                "\n\n[Showing lines {}-{} of {}. Full output in temporary file.]",
                self.next_offset, self.total_lines, self.total_lines
            ),
            (TruncateMode::Tail, Some(TruncatedBy::Bytes)) => format!(
                "\n\n[Showing last {}KB of {}KB. Full output in temporary file.]",
                self.output_bytes / 1024,
                self.total_bytes / 1024
            ),
            (_, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateMode {
    Head,
    Tail,
}

/// Retain the beginning of `content`, cutting it off at whichever of
/// `max_lines`/`max_bytes` is hit first.
pub fn truncate_head(content: &str, max_lines: usize, max_bytes: usize) -> TruncationResult {
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();
    let total_bytes = content.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return TruncationResult::untruncated(content);
    }

    if let Some(first) = lines.first() {
        if first.len() > max_bytes {
            let cut = floor_char_boundary(first, max_bytes / 4);
            return TruncationResult {
                content: first[..cut].to_string(),
                truncated: true,
                truncated_by: Some(TruncatedBy::Bytes),
                total_lines,
                output_lines: 1,
                total_bytes,
                output_bytes: max_bytes,
                first_line_exceeds_limit: true,
                last_line_partial: false,
                next_offset: 2,
            };
        }
    }

    if total_lines > max_lines {
        let output = &lines[..max_lines];
        let content_str = output.join("\n");
        let output_bytes = content_str.len();
        return TruncationResult {
            content: content_str,
            truncated: true,
            truncated_by: Some(TruncatedBy::Lines),
            total_lines,
            output_lines: max_lines,
            total_bytes,
            output_bytes,
            first_line_exceeds_limit: false,
            last_line_partial: false,
            next_offset: max_lines + 1,
        };
    }

    // total_bytes > max_bytes, line count within budget: accumulate lines
    // until the next one would overflow the byte budget.
    let mut bytes_count = 0usize;
    let mut line_count = 0usize;
    for line in &lines {
        let line_bytes = line.len() + 1; // +1 for the joining newline
        if bytes_count + line_bytes > max_bytes {
            break;
        }
        bytes_count += line_bytes;
        line_count += 1;
    }
    let output = &lines[..line_count];
    let content_str = output.join("\n");
    TruncationResult {
        content: content_str,
        truncated: true,
        truncated_by: Some(TruncatedBy::Bytes),
        total_lines,
        output_lines: line_count,
        total_bytes,
        output_bytes: bytes_count,
        first_line_exceeds_limit: false,
        last_line_partial: false,
        next_offset: line_count + 1,
    }
}

/// Retain the end of `content`.
pub fn truncate_tail(content: &str, max_lines: usize, max_bytes: usize) -> TruncationResult {
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();
    let total_bytes = content.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return TruncationResult::untruncated(content);
    }

    if total_lines > max_lines {
        let start_idx = total_lines - max_lines;
        let output = &lines[start_idx..];
        let content_str = output.join("\n");
        let output_bytes = content_str.len();
        return TruncationResult {
            content: content_str,
            truncated: true,
            truncated_by: Some(TruncatedBy::Lines),
            total_lines,
            output_lines: max_lines,
            total_bytes,
            output_bytes,
            first_line_exceeds_limit: false,
            last_line_partial: false,
            next_offset: start_idx + 1,
        };
    }

    // total_bytes > max_bytes: accumulate from the end.
    let mut bytes_count = 0usize;
    let mut line_count = 0usize;
    for line in lines.iter().rev() {
        let line_bytes = line.len() + 1;
        if bytes_count + line_bytes > max_bytes {
            break;
        }
        bytes_count += line_bytes;
        line_count += 1;
    }
    let last_line_partial = line_count == 0 && total_lines > 0;
    if last_line_partial {
        // Even the last line alone overflows the budget; emit a partial
        // suffix of it rather than nothing.
        let last = lines.last().copied().unwrap_or("");
        let cut_from = last.len().saturating_sub(max_bytes);
        let cut_from = ceil_char_boundary(last, cut_from);
        let content_str = last[cut_from..].to_string();
        return TruncationResult {
            content: content_str.clone(),
            truncated: true,
            truncated_by: Some(TruncatedBy::Bytes),
            total_lines,
            output_lines: 1,
            total_bytes,
            output_bytes: content_str.len(),
            first_line_exceeds_limit: false,
            last_line_partial: true,
            next_offset: total_lines,
        };
    }
    let start_idx = total_lines - line_count;
    let output = &lines[start_idx..];
    let content_str = output.join("\n");
    TruncationResult {
        content: content_str,
        truncated: true,
        truncated_by: Some(TruncatedBy::Bytes),
        total_lines,
        output_lines: line_count,
        total_bytes,
        output_bytes: bytes_count,
        first_line_exceeds_limit: false,
        last_line_partial: false,
        next_offset: start_idx + 1,
    }
}

/// 1-indexed `offset`/`limit` slice of `content`, then head-truncated.
/// An `offset` beyond the end of the content is a hard error rather than an
/// empty read.
pub fn read_with_offset(content: &str, offset: usize, limit: Option<usize>) -> CoreResult<TruncationResult> {
    let lines: Vec<&str> = content.split('\n').collect();
    let start_idx = offset.saturating_sub(1);
    if start_idx >= lines.len() {
        return Err(CoreError::OffsetOutOfRange {
            offset,
            total_lines: lines.len(),
        });
    }
    let end_idx = match limit {
        Some(limit) => (start_idx + limit).min(lines.len()),
        None => lines.len(),
    };
    let selected = lines[start_idx..end_idx].join("\n");
    let mut result = truncate_head(&selected, DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES);
    if result.truncated {
        result.next_offset = start_idx + result.output_lines + 1;
    }
    Ok(result)
}

/// Tail-truncated view suited to command output, where the most recent
/// lines matter most.
pub fn truncate_for_bash(content: &str) -> TruncationResult {
    truncate_tail(content, DEFAULT_MAX_LINES, DEFAULT_MAX_BYTES)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_not_truncated() {
        let r = truncate_head("a\nb\nc", 10, 1024);
        assert!(!r.truncated);
        assert_eq!(r.content, "a\nb\nc");
        assert_eq!(r.next_offset, 0);
    }

    #[test]
    fn head_truncates_by_line_count() {
        let content = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let r = truncate_head(&content, 3, 1024);
        assert!(r.truncated);
        assert_eq!(r.truncated_by, Some(TruncatedBy::Lines));
        assert_eq!(r.content, "1\n2\n3");
        assert_eq!(r.next_offset, 4);
    }

    #[test]
    fn tail_truncates_by_line_count() {
        let content = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let r = truncate_tail(&content, 3, 1024);
        assert!(r.truncated);
        assert_eq!(r.content, "8\n9\n10");
        assert_eq!(r.next_offset, 8);
    }

    #[test]
    fn head_truncates_by_byte_budget() {
        let content = "aaaa\nbbbb\ncccc\ndddd";
        // budget covers "aaaa\n" (5) + "bbbb\n" (5) = 10, third line would push to 15
        let r = truncate_head(content, 100, 10);
        assert!(r.truncated);
        assert_eq!(r.truncated_by, Some(TruncatedBy::Bytes));
        assert_eq!(r.content, "aaaa\nbbbb");
        assert_eq!(r.next_offset, 3);
    }

    #[test]
    fn first_line_exceeding_budget_is_flagged() {
        let long_line = "x".repeat(100);
        let r = truncate_head(&long_line, 100, 20);
        assert!(r.first_line_exceeds_limit);
        assert_eq!(r.next_offset, 2);
        assert_eq!(r.content.len(), 20 / 4);
    }

    #[test]
    fn last_line_partial_when_tail_line_alone_overflows() {
        let long_line = "y".repeat(100);
        let r = truncate_tail(&long_line, 100, 20);
        assert!(r.last_line_partial);
        assert!(r.content.len() <= 20);
        assert!(long_line.ends_with(&r.content));
    }

    #[test]
    fn offset_past_end_is_an_error() {
        let err = read_with_offset("a\nb\nc", 10, None).unwrap_err();
        assert!(matches!(err, CoreError::OffsetOutOfRange { .. }));
    }

    #[test]
    fn offset_and_limit_select_a_window() {
        let content = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let r = read_with_offset(&content, 3, Some(2)).unwrap();
        assert_eq!(r.content, "3\n4");
    }

    #[test]
    fn utf8_boundaries_are_never_split() {
        let content = "héllo wörld".repeat(20);
        let r = truncate_head(&content, 100, 30);
        assert!(std::str::from_utf8(r.content.as_bytes()).is_ok());
    }
}
