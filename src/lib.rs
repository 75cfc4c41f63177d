// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Core of a download client's files view: the synthesized file tree, skip
//! and priority handling, and queued relocation of files on disk.

pub mod cli;
pub mod config;
pub mod errors;
pub mod filter;
pub mod formatters;
pub mod memory;
pub mod model;
pub mod natural;
pub mod priority;
pub mod relocate;
pub mod selection;
pub mod torrent_file;
pub mod tree;

pub use errors::FilesViewError;
pub use model::{Download, FileKey, FileRecord, FileRef, Prompter, StorageType};
pub use tree::FileTree;
