//! Greentext line formatting and the board-style post header.

use chrono::{DateTime, Local};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

pub const LINE_MARKER: char = '>';
const POST_ID_RANGE: RangeInclusive<u32> = 100_000_000..=999_999_999;
const TIMESTAMP_FORMAT: &str = "%m/%d/%y(%a)%H:%M:%S";

/// Lines of `text` containing something other than whitespace.
pub fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| !line.trim().is_empty())
}

/// Prefix every non-blank line with `>` unless it already starts with one.
/// Blank lines are dropped.
pub fn format_lines(raw: &str) -> Vec<String> {
    non_blank_lines(raw)
        .map(|line| {
            if line.starts_with(LINE_MARKER) {
                line.to_string()
            } else {
                format!("{LINE_MARKER}{line}")
            }
        })
        .collect()
}

pub fn format_text(raw: &str) -> String {
    format_lines(raw).join("\n")
}

/// Timestamp label and post number shown above a greentext. Minted once per
/// generation so incremental re-renders keep the same header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostHeader {
    pub timestamp: String,
    pub post_id: String,
}

impl PostHeader {
    pub fn mint() -> Self {
        let number = rand::thread_rng().gen_range(POST_ID_RANGE);
        Self::at(Local::now(), number)
    }

    pub fn at(time: DateTime<Local>, number: u32) -> Self {
        Self {
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            post_id: format!("No.{number}"),
        }
    }

    /// `Anonymous {timestamp} {post id}`; also the header of image and PDF exports.
    pub fn post_info(&self) -> String {
        format!("Anonymous {} {}", self.timestamp, self.post_id)
    }
}

/// A post ready for display: fixed header plus formatted lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub header: PostHeader,
    pub lines: Vec<String>,
}

impl RenderedPost {
    pub fn new(header: &PostHeader, raw: &str) -> Self {
        Self {
            header: header.clone(),
            lines: format_lines(raw),
        }
    }
}

impl fmt::Display for RenderedPost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header.post_info())?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
