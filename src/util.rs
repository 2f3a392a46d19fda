use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::record::ContentHash;

pub fn format_size(bytes: u64) -> String {
    let units: [(&str, f64); 6] = [
        ("B", 1.0),
        ("KiB", 1024.0),
        ("MiB", 1024.0f64.powi(2)),
        ("GiB", 1024.0f64.powi(3)),
        ("TiB", 1024.0f64.powi(4)),
        ("PiB", 1024.0f64.powi(5)),
    ];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let mut unit = units[0];
    for candidate in units.iter() {
        unit = *candidate;
        if bytes_f64 < candidate.1 * 1024.0 {
            break;
        }
    }

    let value = bytes_f64 / unit.1;
    if unit.0 == "B" {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", unit.0)
    }
}

pub fn make_magnet(name: &str, size: u64, hash: &ContentHash) -> String {
    let mut encoded = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_' | '~' => encoded.push(ch),
            ' ' => encoded.push('+'),
            other => {
                let mut buffer = [0u8; 4];
                for byte in other.encode_utf8(&mut buffer).bytes() {
                    encoded.push_str(&format!("%{byte:02X}"));
                }
            }
        }
    }

    format!(
        "magnet:?xt=urn:tree:tiger:{}&xl={size}&dn={encoded}",
        hash.to_base32()
    )
}

/// Per-search correlation token, unique within the process lifetime.
pub fn new_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let serial = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64);
    format!("{nanos:x}-{serial}")
}
