// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use chrono::{DateTime, Utc};
use std::{
    collections::VecDeque,
    io::{self, Write},
    num::ParseIntError,
};

/// Default number of retained lines.
pub const RAW_LOG_LINES: usize = 200;

/// One retained raw frame line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// CAN identifier of the frame
    pub id: u32,
    /// Formatted line
    pub text: String,
}

/// Format a raw frame as `[YYYY-mm-dd HH:MM:SS.mmm] ID:XXXX Data:hex`.
pub fn format_line(id: u32, data: &[u8], timestamp: &DateTime<Utc>) -> String {
    format!(
        "[{}] ID:{:04X} Data:{}",
        timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        id,
        hex::encode(data)
    )
}

/// Parse an identifier typed as hex, with or without a `0x` prefix.
pub fn parse_id(text: &str) -> Result<u32, ParseIntError> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(text, 16)
}

/// Bounded log of the most recent raw frames.
#[derive(Debug, Clone)]
pub struct RawLog {
    cap: usize,
    lines: VecDeque<RawLine>,
}

impl Default for RawLog {
    fn default() -> Self {
        RawLog::new(RAW_LOG_LINES)
    }
}

impl RawLog {
    /// Empty log retaining at most `cap` lines. The latest line is always
    /// kept, so a `cap` of 0 behaves as 1.
    pub fn new(cap: usize) -> Self {
        RawLog {
            cap: cap.max(1),
            lines: VecDeque::with_capacity(cap.max(1)),
        }
    }

    /// Record one frame, evicting the oldest line when full.
    pub fn push(&mut self, id: u32, data: &[u8], timestamp: &DateTime<Utc>) -> &RawLine {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(RawLine {
            id,
            text: format_line(id, data, timestamp),
        });
        &self.lines[self.lines.len() - 1]
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &RawLine> {
        self.lines.iter()
    }

    /// Retained lines for one identifier, or all of them when `id` is `None`.
    pub fn filter(&self, id: Option<u32>) -> impl Iterator<Item = &RawLine> {
        self.lines
            .iter()
            .filter(move |line| id.map_or(true, |id| line.id == id))
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Drop every retained line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Write the retained lines matching `id`, one per line.
    pub fn write_to<W: Write>(&self, writer: &mut W, id: Option<u32>) -> io::Result<usize> {
        let mut count = 0;
        for line in self.filter(id) {
            writeln!(writer, "{}", line.text)?;
            count += 1;
        }
        writer.flush()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
    }

    #[test]
    fn test_format_line() {
        let line = format_line(0x60A, &[0x05, 0x64, 0x00, 0, 0, 0x0A, 0x00, 0], &at(42));
        assert_eq!(line, "[2023-11-14 22:13:20.042] ID:060A Data:05640000000a0000");
        assert_eq!(format_line(0x201, &[], &at(0)), "[2023-11-14 22:13:20.000] ID:0201 Data:");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("60A").unwrap(), 0x60A);
        assert_eq!(parse_id(" 0x201 ").unwrap(), 0x201);
        assert_eq!(parse_id("0X60b").unwrap(), 0x60B);
        assert!(parse_id("xyz").is_err());
        assert!(parse_id("").is_err());
    }

    #[test]
    fn test_ring() {
        let mut log = RawLog::new(3);
        for i in 0..5u32 {
            log.push(0x600 + i, &[i as u8], &at(i as i64));
        }
        assert_eq!(log.len(), 3);
        let ids: Vec<_> = log.lines().map(|line| line.id).collect();
        assert_eq!(ids, vec![0x602, 0x603, 0x604]);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_default_cap() {
        let mut log = RawLog::default();
        for i in 0..250 {
            log.push(0x60A, &[i as u8], &at(i));
        }
        assert_eq!(log.len(), RAW_LOG_LINES);
        assert!(log.lines().next().unwrap().text.ends_with("Data:32"));
    }

    #[test]
    fn test_filter_and_export() {
        let mut log = RawLog::default();
        log.push(0x60A, &[1], &at(0));
        log.push(0x201, &[2], &at(1));
        log.push(0x60A, &[3], &at(2));

        assert_eq!(log.filter(Some(0x60A)).count(), 2);
        assert_eq!(log.filter(Some(0x201)).count(), 1);
        assert_eq!(log.filter(Some(0x7FF)).count(), 0);
        assert_eq!(log.filter(None).count(), 3);

        let mut out = Vec::new();
        assert_eq!(log.write_to(&mut out, Some(0x60A)).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "[2023-11-14 22:13:20.000] ID:060A Data:01\n[2023-11-14 22:13:20.002] ID:060A Data:03\n"
        );
    }
}
