//! File content decoding and directory listings.

use arbor_store::{EntryKind, EntryMode};
use arbor_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How [`Repository::read_file`](crate::Repository::read_file) should
/// return content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// UTF-8 text; binary content is an error.
    Text,
    /// Bytes as stored.
    Raw,
    /// Text unless the content looks binary or is not UTF-8.
    #[default]
    Auto,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Raw(Vec<u8>),
}

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Raw(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Raw(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Raw(b) => b,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub content: Content,
    pub mode: EntryMode,
    pub object_id: ObjectId,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    /// Full path from the repository root.
    pub path: String,
    pub kind: EntryKind,
    pub mode: EntryMode,
    pub object_id: ObjectId,
}

/// A zero byte within the first `limit` bytes marks content as binary.
pub fn looks_binary(data: &[u8], limit: usize) -> bool {
    data[..data.len().min(limit)].contains(&0)
}

pub(crate) fn decode(path: &str, data: Vec<u8>, encoding: Encoding, limit: usize) -> Result<Content> {
    let binary = || Error::BinaryFile {
        path: path.to_string(),
    };
    match encoding {
        Encoding::Raw => Ok(Content::Raw(data)),
        Encoding::Text => {
            if looks_binary(&data, limit) {
                return Err(binary());
            }
            String::from_utf8(data).map(Content::Text).map_err(|_| binary())
        }
        Encoding::Auto => {
            if looks_binary(&data, limit) {
                return Ok(Content::Raw(data));
            }
            Ok(match String::from_utf8(data) {
                Ok(text) => Content::Text(text),
                Err(e) => Content::Raw(e.into_bytes()),
            })
        }
    }
}
