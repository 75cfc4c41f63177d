// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::priority::PriorityClass;
use crate::tree::SkipState;

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    const TB: u64 = 1024 * GB;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes < TB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    }
}

pub fn format_percent(done: u64, total: u64) -> String {
    if total == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", done as f64 * 100.0 / total as f64)
}

/// Checkbox-style marker for a row's skip state.
pub fn skip_marker(state: SkipState) -> &'static str {
    match state {
        SkipState::NoneSkipped => "[x]",
        SkipState::AllSkipped => "[ ]",
        SkipState::Mixed => "[~]",
    }
}

pub fn format_priority(priority: i32) -> String {
    match PriorityClass::of(priority) {
        PriorityClass::High => "high".to_string(),
        PriorityClass::Normal => "normal".to_string(),
        PriorityClass::Low => "low".to_string(),
        PriorityClass::Numeric(value) => value.to_string(),
    }
}

pub fn format_piece_range(first: u32, last: u32) -> String {
    if first == last {
        format!("piece {}", first)
    } else {
        format!("pieces {}-{}", first, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3.00 TB");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(1, 4), "25.0%");
        assert_eq!(format_percent(0, 0), "-");
    }

    #[test]
    fn test_format_priority_and_pieces() {
        assert_eq!(format_priority(1), "high");
        assert_eq!(format_priority(0), "normal");
        assert_eq!(format_priority(-1), "low");
        assert_eq!(format_priority(42), "42");
        assert_eq!(format_piece_range(3, 3), "piece 3");
        assert_eq!(format_piece_range(0, 7), "pieces 0-7");
    }
}
