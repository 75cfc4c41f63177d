// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod parser;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Torrent {
    // Not part of the bencode source, filled in by the parser.
    #[serde(skip)]
    pub info_dict_bencode: Vec<u8>,

    pub info: Info,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<String>,

    #[serde(rename = "creation date", default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(rename = "created by", default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Torrent {
    /// Hex SHA-1 of the raw info dictionary.
    pub fn info_hash_hex(&self) -> String {
        hex::encode(Sha1::digest(&self.info_dict_bencode))
    }

    /// Path segments, length and pad flag of every file, in torrent order.
    /// Single-file torrents report one entry named after the torrent.
    pub fn file_list(&self) -> Vec<(Vec<String>, u64, bool)> {
        if !self.info.files.is_empty() {
            self.info
                .files
                .iter()
                .map(|f| (f.path.clone(), f.length.max(0) as u64, f.is_pad()))
                .collect()
        } else {
            vec![(
                vec![self.info.name.clone()],
                self.info.length.max(0) as u64,
                false,
            )]
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Info {
    #[serde(rename = "piece length")]
    pub piece_length: i64,

    #[serde(with = "serde_bytes")]
    #[serde(default)]
    pub pieces: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<InfoFile>,

    pub name: String,

    #[serde(default)]
    pub length: i64,
}

impl Info {
    pub fn total_length(&self) -> i64 {
        if self.length > 0 {
            return self.length;
        }
        self.files.iter().map(|f| f.length).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InfoFile {
    pub length: i64,

    pub path: Vec<String>,

    // BEP 47 file attributes; 'p' marks padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

impl InfoFile {
    pub fn is_pad(&self) -> bool {
        self.attr.as_deref().is_some_and(|a| a.contains('p'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_list_uses_torrent_name() {
        let torrent = Torrent {
            info: Info {
                name: "movie.mkv".to_string(),
                length: 4096,
                piece_length: 1024,
                ..Info::default()
            },
            ..Torrent::default()
        };

        assert_eq!(
            torrent.file_list(),
            vec![(vec!["movie.mkv".to_string()], 4096, false)]
        );
        assert_eq!(torrent.info.total_length(), 4096);
    }

    #[test]
    fn test_pad_attribute_detection() {
        let pad = InfoFile {
            length: 10,
            path: vec![".pad".into(), "10".into()],
            attr: Some("p".into()),
        };
        let hidden = InfoFile {
            length: 10,
            path: vec!["x".into()],
            attr: Some("h".into()),
        };
        assert!(pad.is_pad());
        assert!(!hidden.is_pad());
        assert!(!InfoFile::default().is_pad());
    }
}
