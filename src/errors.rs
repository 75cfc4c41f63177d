// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilesViewError {
    #[error("'{0}' is not a valid priority, expected a whole number")]
    InvalidPriority(String),

    #[error("'{0}' is not a valid file name")]
    InvalidFileName(String),

    #[error("Download '{0}' is not available")]
    DownloadUnavailable(String),

    #[error("Batch retarget text has invalid lines:\n{}", .0.join("\n"))]
    InvalidBatchText(Vec<String>),

    #[error("The file operation dispatcher has been shut down.")]
    DispatcherShutdown,

    #[error("No file or folder '{0}' in this download")]
    PathNotFound(String),

    #[error("Could not load torrent: {0}")]
    Torrent(#[from] crate::torrent_file::parser::ParseError),

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
