use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-size content digest used for cross-source grouping and
/// deduplication. Compared and hashed by value, rendered as base32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 24]);

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

impl ContentHash {
    pub fn to_base32(&self) -> String {
        let mut out = String::with_capacity(39);
        let mut buffer: u32 = 0;
        let mut bits = 0;
        for byte in self.0 {
            buffer = (buffer << 8) | u32::from(byte);
            bits += 8;
            while bits >= 5 {
                bits -= 5;
                let index = ((buffer >> bits) & 0x1f) as usize;
                out.push(BASE32_ALPHABET[index] as char);
            }
        }
        if bits > 0 {
            let index = ((buffer << (5 - bits)) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHashError;

impl fmt::Display for ParseHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid base32 content hash")
    }
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.len() != 39 {
            return Err(ParseHashError);
        }

        let mut bytes = [0u8; 24];
        let mut buffer: u32 = 0;
        let mut bits = 0;
        let mut cursor = 0;
        for ch in input.bytes() {
            let value = match ch {
                b'A'..=b'Z' => u32::from(ch - b'A'),
                b'a'..=b'z' => u32::from(ch - b'a'),
                b'2'..=b'7' => u32::from(ch - b'2') + 26,
                _ => return Err(ParseHashError),
            };
            buffer = (buffer << 5) | value;
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                if cursor < bytes.len() {
                    bytes[cursor] = ((buffer >> bits) & 0xff) as u8;
                    cursor += 1;
                }
            }
        }

        if cursor != bytes.len() {
            return Err(ParseHashError);
        }

        Ok(ContentHash(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_base32())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base32())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque user identity delivered by the network layer. Two records from
/// the same user carry equal identities regardless of hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    File,
    Directory,
}

/// One raw search response, immutable once received. `hash` is present
/// only for file results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub kind: RecordKind,
    pub hash: Option<ContentHash>,
    pub size: u64,
    pub path: String,
    pub free_slots: u32,
    pub total_slots: u32,
    pub user: UserId,
    pub nick: String,
    pub hub_name: String,
    pub hub_url: String,
    pub address: String,
    #[serde(default)]
    pub token: String,
}

impl SearchRecord {
    pub fn is_file(&self) -> bool {
        self.kind == RecordKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == RecordKind::Directory
    }

    /// Base name for files, the full remote path for directories.
    pub fn file_name(&self) -> &str {
        if self.is_file() {
            match self.path.rfind('/') {
                Some(i) if i + 1 < self.path.len() => &self.path[i + 1..],
                _ => &self.path,
            }
        } else {
            &self.path
        }
    }

    /// Directory part of a file's remote path, trailing separator kept.
    pub fn file_path(&self) -> &str {
        if self.is_file() {
            if let Some(i) = self.path.rfind('/') {
                if i > 0 && i + 1 < self.path.len() {
                    return &self.path[..=i];
                }
            }
        }
        &self.path
    }

    pub fn file_ext(&self) -> String {
        if self.is_file() {
            let name = self.file_name();
            if let Some(i) = name.rfind('.') {
                if i > 0 && i + 1 < name.len() {
                    return name[i + 1..].to_uppercase();
                }
            }
        }
        String::new()
    }

    /// Numeric form of the source IPv4 address, 0 when unparseable.
    pub fn bin_addr(&self) -> u32 {
        match self.address.parse::<std::net::Ipv4Addr>() {
            Ok(addr) => u32::from(addr),
            Err(_) => 0,
        }
    }
}
