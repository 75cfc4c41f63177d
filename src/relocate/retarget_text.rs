// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::{group_by_download, Download, FileRecord, FileRef};
use crate::relocate::RelocateRequest;

/// Editable listing of the current file locations, one `<index> <path>` line
/// per file. Downloads get a `# <internal name> - <display name>` header when
/// more than one is listed.
pub fn batch_retarget_text(files: &[FileRef]) -> String {
    let groups = group_by_download(files);
    let with_headers = groups.len() > 1;

    let mut text = String::new();
    for (i, (download, records)) in groups.iter().enumerate() {
        if with_headers {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(&format!(
                "# {} - {}\n\n",
                download.internal_name(),
                download.display_name()
            ));
        }
        for record in records {
            text.push_str(&format!(
                "{:<4} {}\n",
                record.index() + 1,
                record.file_path().display()
            ));
        }
    }
    text
}

struct Section {
    download: Arc<dyn Download>,
    files: Option<Vec<Arc<dyn FileRecord>>>,
}

impl Section {
    fn new(download: Arc<dyn Download>) -> Self {
        Self {
            download,
            files: None,
        }
    }

    fn file(&mut self, index: usize) -> Option<Arc<dyn FileRecord>> {
        if self.files.is_none() {
            match self.download.file_set() {
                Ok(files) => self.files = Some(files),
                Err(e) => {
                    tracing::warn!("{}", e);
                    return None;
                }
            }
        }
        self.files.as_ref()?.get(index).cloned()
    }
}

/// Reads an edited listing back. Lines before any header belong to the last
/// download. Returns requests for the paths that changed, or every invalid
/// line if there was one.
pub fn parse_batch_retarget(
    text: &str,
    downloads: &[Arc<dyn Download>],
) -> Result<Vec<RelocateRequest>, Vec<String>> {
    let mut errors = Vec::new();
    let mut requests = Vec::new();
    let mut section = downloads.last().cloned().map(Section::new);

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let invalid = || format!("Invalid line: {}", line);

        if line.starts_with('#') {
            let found = line
                .split_whitespace()
                .nth(1)
                .and_then(|name| downloads.iter().find(|d| d.internal_name() == name));
            match found {
                Some(download) => section = Some(Section::new(download.clone())),
                None => errors.push(invalid()),
            }
            continue;
        }

        let Some((index, path)) = line.split_once(char::is_whitespace) else {
            errors.push(invalid());
            continue;
        };
        let path = path.trim();
        let record = index
            .parse::<usize>()
            .ok()
            .and_then(|i| i.checked_sub(1))
            .zip(section.as_mut())
            .and_then(|(i, section)| section.file(i));

        match (record, &section) {
            (Some(record), Some(section)) if !path.is_empty() => {
                let target = PathBuf::from(path);
                if target != record.file_path() {
                    requests.push(RelocateRequest {
                        file: FileRef::new(section.download.clone(), record),
                        target,
                    });
                }
            }
            _ => errors.push(invalid()),
        }
    }

    if errors.is_empty() {
        Ok(requests)
    } else {
        Err(errors)
    }
}
