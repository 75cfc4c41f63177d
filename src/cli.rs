// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::errors::FilesViewError;
use crate::filter::{FilesFilter, TextFilter};
use crate::formatters::{format_bytes, format_percent, format_piece_range, format_priority, skip_marker};
use crate::memory::MemoryDownload;
use crate::relocate::batch_retarget_text;
use crate::torrent_file::parser;
use crate::tree::{split_path, FileTree, NodeId, TreeMathHelper, TreeViewState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the file tree of a torrent with sizes and skip markers.
    Show {
        torrent: PathBuf,
        /// Directory the download is saved in. Defaults to the current one.
        #[arg(long)]
        save_dir: Option<PathBuf>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        hide_dnd: bool,
        /// Files or folders to mark as not downloaded, `/`-separated.
        #[arg(long, num_args = 1..)]
        skip: Vec<String>,
        #[arg(long)]
        collapsed: bool,
    },
    /// Print the editable batch retarget listing of a torrent.
    RetargetText {
        torrent: PathBuf,
        #[arg(long)]
        save_dir: Option<PathBuf>,
    },
}

pub fn load_download(
    torrent_path: &Path,
    save_dir: Option<&Path>,
    settings: &Settings,
) -> Result<Arc<MemoryDownload>, FilesViewError> {
    let torrent = parser::from_file(torrent_path)?;
    let save_dir = match save_dir {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir()?,
    };
    // Multi-file torrents live in a folder named after the torrent.
    let save_location = if torrent.info.files.is_empty() {
        save_dir
    } else {
        save_dir.join(&torrent.info.name)
    };

    tracing::info!(
        "Loaded '{}' ({} files) from {:?}",
        torrent.info.name,
        torrent.file_list().len(),
        torrent_path
    );
    Ok(Arc::new(
        MemoryDownload::from_torrent(&torrent, save_location)
            .with_incomplete_suffix(settings.incomplete_file_suffix.clone()),
    ))
}

/// Looks up a node by its `/`-separated path below the root.
pub fn find_node(tree: &FileTree, path: &str) -> Option<NodeId> {
    split_path(path).into_iter().try_fold(tree.root(), |node, segment| {
        tree.children(node)
            .iter()
            .copied()
            .find(|&child| tree.name(child) == segment)
    })
}

pub fn render_tree(tree: &FileTree, state: &TreeViewState, filter: &FilesFilter) -> String {
    let root = tree.root();
    let mut out = format!(
        "{} {}  {}  {}\n",
        skip_marker(tree.skipped_state(root)),
        tree.name(root),
        format_bytes(tree.length(root)),
        format_percent(tree.downloaded(root), tree.length(root))
    );

    for row in TreeMathHelper::all_rows(tree, state, filter) {
        let mut line = format!(
            "{}{} {}{}  {}  {}",
            "  ".repeat(row.depth + 1),
            skip_marker(tree.skipped_state(row.id)),
            tree.name(row.id),
            if tree.is_leaf(row.id) { "" } else { "/" },
            format_bytes(tree.length(row.id)),
            format_percent(tree.downloaded(row.id), tree.length(row.id))
        );
        if let Some(record) = tree.record(row.id) {
            line.push_str(&format!(
                "  {}  {}",
                format_priority(record.priority()),
                format_piece_range(record.first_piece(), record.last_piece())
            ));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn run(cli: Cli, settings: &Settings) -> Result<String, FilesViewError> {
    match cli.command {
        Commands::Show {
            torrent,
            save_dir,
            filter,
            regex,
            hide_dnd,
            skip,
            collapsed,
        } => {
            let download = load_download(&torrent, save_dir.as_deref(), settings)?;
            let tree = FileTree::from_download(download);

            for path in &skip {
                let node = find_node(&tree, path).ok_or_else(|| FilesViewError::PathNotFound(path.clone()))?;
                let report = tree.set_skipped(node, true);
                tracing::debug!("Skipped {} file(s) under '{}'", report.changed, path);
            }

            let filter = match filter {
                Some(text) => FilesFilter::new(
                    hide_dnd || settings.hide_dnd_files,
                    TextFilter::new(&text, regex)?,
                ),
                None => {
                    let mut saved = FilesFilter::from_settings(settings);
                    saved.hide_dnd |= hide_dnd;
                    saved
                }
            };

            let mut state = TreeViewState::new();
            if !collapsed {
                state.expand_all(&tree);
            }
            Ok(render_tree(&tree, &state, &filter))
        }
        Commands::RetargetText { torrent, save_dir } => {
            let download = load_download(&torrent, save_dir.as_deref(), settings)?;
            Ok(batch_retarget_text(&download.file_refs()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileRecord;
    use crate::torrent_file::{Info, InfoFile, Torrent};
    use std::fs;

    fn write_torrent(dir: &Path) -> PathBuf {
        let file = |length, path: &[&str]| InfoFile {
            length,
            path: path.iter().map(|s| s.to_string()).collect(),
            attr: None,
        };
        let torrent = Torrent {
            info: Info {
                name: "example".to_string(),
                piece_length: 16384,
                pieces: vec![0u8; 20],
                files: vec![file(100, &["a", "x.txt"]), file(50, &["a", "y.txt"]), file(10, &["b.txt"])],
                ..Info::default()
            },
            ..Torrent::default()
        };
        let path = dir.join("example.torrent");
        fs::write(&path, serde_bencode::to_bytes(&torrent).unwrap()).unwrap();
        path
    }

    fn show(dir: &Path, extra: &[&str]) -> String {
        let torrent = write_torrent(dir);
        let mut args = vec![
            "filesview".to_string(),
            "show".to_string(),
            torrent.display().to_string(),
            "--save-dir".to_string(),
            dir.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        run(Cli::try_parse_from(args).unwrap(), &Settings::default()).unwrap()
    }

    #[test]
    fn test_show_prints_sorted_tree_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let out = show(dir.path(), &[]);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(
            lines,
            vec![
                "[x] example  160 B  0.0%",
                "  [x] a/  150 B  0.0%",
                "    [x] x.txt  100 B  0.0%  normal  piece 0",
                "    [x] y.txt  50 B  0.0%  normal  piece 0",
                "  [x] b.txt  10 B  0.0%  normal  piece 0",
            ]
        );
    }

    #[test]
    fn test_show_skip_marks_parents_mixed() {
        let dir = tempfile::tempdir().unwrap();
        let out = show(dir.path(), &["--skip", "a/x.txt", "--collapsed"]);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "[~] example  160 B  0.0%");
        assert_eq!(lines[1], "  [~] a/  150 B  0.0%");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_show_filter_and_hide_dnd() {
        let dir = tempfile::tempdir().unwrap();
        let out = show(dir.path(), &["--filter", "y.txt"]);
        assert!(out.contains("y.txt"));
        assert!(!out.contains("x.txt"));
        assert!(!out.contains("b.txt"));

        let out = show(dir.path(), &["--skip", "a", "--hide-dnd"]);
        assert!(!out.contains("a/"));
        assert!(out.contains("b.txt"));
    }

    #[test]
    fn test_show_lists_priority_and_pieces_of_files() {
        let dir = tempfile::tempdir().unwrap();
        let download = MemoryDownload::new(
            "id".to_string(),
            "wide",
            dir.path(),
            100,
            vec![
                crate::memory::FileSpec {
                    segments: vec!["big".into()],
                    length: 250,
                    pad: false,
                },
                crate::memory::FileSpec {
                    segments: vec!["small".into()],
                    length: 10,
                    pad: false,
                },
            ],
        );
        download.file(0).set_priority(1);
        download.file(1).set_priority(7);
        let tree = FileTree::from_download(Arc::new(download));
        let mut state = TreeViewState::new();
        state.expand_all(&tree);

        let out = render_tree(&tree, &state, &FilesFilter::default());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "  [x] big  250 B  0.0%  high  pieces 0-2");
        assert_eq!(lines[2], "  [x] small  10 B  0.0%  7  piece 2");
    }

    #[test]
    fn test_unknown_skip_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let torrent = write_torrent(dir.path());
        let cli = Cli::try_parse_from([
            "filesview",
            "show",
            torrent.to_str().unwrap(),
            "--skip",
            "nope",
        ])
        .unwrap();
        assert!(matches!(
            run(cli, &Settings::default()),
            Err(FilesViewError::PathNotFound(p)) if p == "nope"
        ));
    }

    #[test]
    fn test_retarget_text_lists_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let torrent = write_torrent(dir.path());
        let cli = Cli::try_parse_from([
            "filesview",
            "retarget-text",
            torrent.to_str().unwrap(),
            "--save-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();

        let out = run(cli, &Settings::default()).unwrap();
        let root = dir.path().join("example");
        let first = format!("1    {}", root.join("a").join("x.txt").display());
        assert_eq!(out.lines().count(), 3);
        assert_eq!(out.lines().next(), Some(first.as_str()));
    }
}
