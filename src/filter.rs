// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::MAIN_SEPARATOR;

use regex::{Regex, RegexBuilder};

use crate::config::Settings;
use crate::errors::FilesViewError;
use crate::model::FileRecord;

/// Text filter applied to file names, or to full paths once the filter
/// itself contains a path separator.
#[derive(Debug, Clone)]
pub struct TextFilter {
    pattern: Regex,
    match_result: bool,
    full_path: bool,
}

impl TextFilter {
    /// Literal filters treat `|` and `;` as alternatives. Regex filters may
    /// start with `!` to invert the match. An empty filter yields `None`.
    pub fn new(filter: &str, regex: bool) -> Result<Option<Self>, FilesViewError> {
        if filter.is_empty() {
            return Ok(None);
        }

        let full_path = filter.contains(MAIN_SEPARATOR) || filter.contains('/');

        let (expression, match_result) = if regex {
            match filter.strip_prefix('!') {
                Some(rest) => (rest.to_string(), false),
                None => (filter.to_string(), true),
            }
        } else {
            let alternatives: Vec<String> = filter
                .split(['|', ';'])
                .map(regex::escape)
                .collect();
            (alternatives.join("|"), true)
        };

        let pattern = RegexBuilder::new(&expression)
            .case_insensitive(true)
            .build()?;

        Ok(Some(Self {
            pattern,
            match_result,
            full_path,
        }))
    }

    pub fn matches(&self, record: &dyn FileRecord) -> bool {
        let path = record.file_path();
        let subject = if self.full_path {
            path.to_string_lossy().to_string()
        } else {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| record.relative_path())
        };
        self.pattern.is_match(&subject) == self.match_result
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilesFilter {
    pub hide_dnd: bool,
    pub text: Option<TextFilter>,
}

impl FilesFilter {
    pub fn new(hide_dnd: bool, text: Option<TextFilter>) -> Self {
        Self { hide_dnd, text }
    }

    /// Builds the filter from persisted preferences. An expression that no
    /// longer compiles is dropped rather than hiding every row.
    pub fn from_settings(settings: &Settings) -> Self {
        let text = match TextFilter::new(&settings.filter_text, settings.filter_regex) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Ignoring saved files filter '{}': {}", settings.filter_text, e);
                None
            }
        };
        Self::new(settings.hide_dnd_files, text)
    }

    pub fn is_text_active(&self) -> bool {
        self.text.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.hide_dnd || self.text.is_some()
    }

    pub fn matches_record(&self, record: &dyn FileRecord) -> bool {
        if self.hide_dnd && record.is_skipped() {
            return false;
        }
        match &self.text {
            Some(text) => text.matches(record),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDownload;

    fn records() -> std::sync::Arc<MemoryDownload> {
        MemoryDownload::with_files(
            "show",
            "/downloads/show",
            &[
                ("Season 1/Episode.01.mkv", 100),
                ("Season 1/Episode.02.MKV", 100),
                ("Season 1/notes.txt", 1),
                ("extras/Trailer.mp4", 10),
            ],
        )
    }

    #[test]
    fn test_empty_filter_is_none() {
        assert!(TextFilter::new("", false).unwrap().is_none());
        assert!(TextFilter::new("", true).unwrap().is_none());
    }

    #[test]
    fn test_literal_alternatives_are_case_insensitive() {
        let d = records();
        let filter = TextFilter::new("mkv|trailer", false).unwrap().unwrap();
        let hits: Vec<bool> = d.files().iter().map(|f| filter.matches(&**f)).collect();
        assert_eq!(hits, vec![true, true, false, true]);

        // Regex metacharacters are literal outside regex mode.
        let dotted = TextFilter::new("e.01", false).unwrap().unwrap();
        assert!(dotted.matches(&*d.file(0)));
        assert!(!dotted.matches(&*d.file(1)));
    }

    #[test]
    fn test_regex_negation() {
        let d = records();
        let filter = TextFilter::new(r"!\.mkv$", true).unwrap().unwrap();
        let hits: Vec<bool> = d.files().iter().map(|f| filter.matches(&**f)).collect();
        assert_eq!(hits, vec![false, false, true, true]);
    }

    #[test]
    fn test_separator_switches_to_full_path() {
        let d = records();
        let filter = TextFilter::new("extras/", false).unwrap().unwrap();
        assert!(filter.matches(&*d.file(3)));
        assert!(!filter.matches(&*d.file(0)));
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        assert!(matches!(
            TextFilter::new("([", true),
            Err(FilesViewError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_hide_dnd() {
        let d = records();
        d.file(2).set_skipped(true);
        let filter = FilesFilter::new(true, None);
        assert!(filter.is_active());
        assert!(!filter.is_text_active());
        assert!(filter.matches_record(&*d.file(0)));
        assert!(!filter.matches_record(&*d.file(2)));
    }

    #[test]
    fn test_from_settings_drops_broken_expression() {
        let settings = Settings {
            filter_text: "([".to_string(),
            filter_regex: true,
            hide_dnd_files: true,
            ..Settings::default()
        };
        let filter = FilesFilter::from_settings(&settings);
        assert!(filter.hide_dnd);
        assert!(filter.text.is_none());
    }
}
