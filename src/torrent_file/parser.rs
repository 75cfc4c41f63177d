// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::torrent_file::Torrent;
use serde_bencode::de;
use serde_bencode::value::Value;

use std::fmt;

#[derive(Debug)]
pub enum ParseError {
    Bencode(serde_bencode::Error),
    MissingInfoDict,
    Io(std::io::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::Bencode(e) => write!(f, "Bencode parsing error: {}", e),
            ParseError::MissingInfoDict => write!(f, "Missing 'info' dictionary in torrent file"),
            ParseError::Io(e) => write!(f, "Could not read torrent file: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<serde_bencode::Error> for ParseError {
    fn from(e: serde_bencode::Error) -> Self {
        ParseError::Bencode(e)
    }
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::Io(e)
    }
}

pub fn from_bytes(bencode_data: &[u8]) -> Result<Torrent, ParseError> {
    // Generic pass first so the raw info dictionary can be re-encoded for hashing.
    let generic_bencode: Value = de::from_bytes(bencode_data)?;

    let info_dict_value = if let Value::Dict(mut top_level_dict) = generic_bencode {
        top_level_dict
            .remove("info".as_bytes())
            .ok_or(ParseError::MissingInfoDict)?
    } else {
        return Err(ParseError::MissingInfoDict);
    };

    let info_dict_bencode = serde_bencode::to_bytes(&info_dict_value)?;

    let mut torrent: Torrent = de::from_bytes(bencode_data)?;

    if torrent.info.length == 0 {
        torrent.info.length = torrent.info.total_length();
    }

    torrent.info_dict_bencode = info_dict_bencode;

    Ok(torrent)
}

pub fn from_file(path: &std::path::Path) -> Result<Torrent, ParseError> {
    let bytes = std::fs::read(path)?;
    from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent_file::{Info, InfoFile, Torrent};
    use std::collections::HashMap;

    fn multi_file_torrent() -> Torrent {
        Torrent {
            info: Info {
                name: "album".to_string(),
                piece_length: 16384,
                pieces: vec![0u8; 20],
                files: vec![
                    InfoFile {
                        length: 100,
                        path: vec!["cd1".into(), "01.flac".into()],
                        attr: None,
                    },
                    InfoFile {
                        length: 16284,
                        path: vec![".pad".into(), "16284".into()],
                        attr: Some("p".into()),
                    },
                    InfoFile {
                        length: 50,
                        path: vec!["cover.jpg".into()],
                        attr: None,
                    },
                ],
                ..Info::default()
            },
            announce: Some("http://tracker.test/announce".to_string()),
            ..Torrent::default()
        }
    }

    #[test]
    fn test_parse_multi_file_torrent() {
        let bencoded = serde_bencode::to_bytes(&multi_file_torrent()).expect("Serialization failed");
        let parsed = from_bytes(&bencoded).expect("Parsing failed");

        assert_eq!(parsed.info.name, "album");
        assert_eq!(parsed.info.length, 16434);
        let files = parsed.file_list();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].0, vec!["cd1".to_string(), "01.flac".to_string()]);
        assert!(files[1].2);
        assert!(!files[2].2);
        assert!(!parsed.info_dict_bencode.is_empty());
    }

    #[test]
    fn test_info_hash_only_depends_on_info_dict() {
        let mut first = multi_file_torrent();
        let mut second = multi_file_torrent();
        first.comment = Some("one".into());
        second.comment = Some("two".into());

        let a = from_bytes(&serde_bencode::to_bytes(&first).unwrap()).unwrap();
        let b = from_bytes(&serde_bencode::to_bytes(&second).unwrap()).unwrap();
        assert_eq!(a.info_hash_hex(), b.info_hash_hex());
        assert_eq!(a.info_hash_hex().len(), 40);
    }

    #[test]
    fn test_missing_info_dict() {
        let mut top = HashMap::new();
        top.insert(
            "announce".as_bytes().to_vec(),
            Value::Bytes(b"http://tracker.test".to_vec()),
        );
        let bencoded = serde_bencode::to_bytes(&Value::Dict(top)).unwrap();
        assert!(matches!(
            from_bytes(&bencoded),
            Err(ParseError::MissingInfoDict)
        ));
    }
}
