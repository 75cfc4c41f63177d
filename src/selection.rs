// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashMap;

use crate::model::{FileKey, FileRef};
use crate::priority::{PRIORITY_HIGH, PRIORITY_LOW, PRIORITY_NORMAL};

/// Size summary of the selected files that are wanted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionTotals {
    pub files: usize,
    pub length: u64,
    pub downloaded: u64,
}

impl SelectionTotals {
    pub fn of(files: &[FileRef]) -> Self {
        files
            .iter()
            .filter(|f| !f.record.is_skipped())
            .fold(Self::default(), |mut totals, f| {
                totals.files += 1;
                totals.length += f.record.length();
                totals.downloaded += f.record.downloaded();
                totals
            })
    }

    pub fn percent_done(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        self.downloaded as f64 * 100.0 / self.length as f64
    }
}

/// Which file actions make sense for the current selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MenuState {
    pub can_relocate: bool,
    pub can_set_priority: bool,
    pub can_set_high: bool,
    pub can_set_normal: bool,
    pub can_set_low: bool,
    pub can_skip: bool,
    pub can_delete: bool,
    pub can_revert: bool,
    /// Relocated files of multi-file downloads; single-file downloads keep
    /// their link.
    pub files_with_links: Vec<FileKey>,
}

impl MenuState {
    pub fn can_clear_links(&self) -> bool {
        !self.files_with_links.is_empty()
    }

    pub fn summarize(files: &[FileRef]) -> Self {
        if files.is_empty() {
            return Self::default();
        }

        let mut all_persistent = true;
        let mut all_compact = true;
        let mut all_dnd_not_deleted = true;
        let mut all_high = true;
        let mut all_normal = true;
        let mut all_low = true;
        let mut all_pad = true;
        let mut any_relocated = false;
        let mut files_with_links = Vec::new();

        let mut file_counts: HashMap<String, usize> = HashMap::new();

        for file in files {
            let record = &file.record;
            let download_id = file.download.id();

            if !file.download.is_persistent() {
                all_persistent = false;
            }
            if !record.is_pad_file() {
                all_pad = false;
            }

            let compact = record.storage_type().is_compact();
            all_compact &= compact;

            if record.is_skipped() {
                all_high = false;
                all_normal = false;
                all_low = false;
                if compact {
                    all_dnd_not_deleted = false;
                }
            } else {
                all_dnd_not_deleted = false;
                match record.priority() {
                    PRIORITY_NORMAL => {
                        all_high = false;
                        all_low = false;
                    }
                    PRIORITY_HIGH => {
                        all_normal = false;
                        all_low = false;
                    }
                    PRIORITY_LOW => {
                        all_normal = false;
                        all_high = false;
                    }
                    _ => {
                        all_high = false;
                        all_normal = false;
                        all_low = false;
                    }
                }
            }

            if record.is_relocated() {
                any_relocated = true;

                let count = *file_counts.entry(download_id).or_insert_with(|| {
                    file.download
                        .file_set()
                        .map(|set| set.len())
                        .unwrap_or_default()
                });
                if count > 1 {
                    files_with_links.push(record.key());
                }
            }
        }

        Self {
            can_relocate: all_persistent,
            can_set_priority: !all_pad,
            can_set_high: !all_high,
            can_set_normal: !all_normal,
            can_set_low: !all_low,
            can_skip: !all_dnd_not_deleted,
            can_delete: !all_compact,
            can_revert: any_relocated,
            files_with_links,
        }
    }
}
