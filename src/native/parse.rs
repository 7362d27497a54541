//! Parser for `zfs diff -F -H` output.
//!
//! Each line is `<change>\t<type>\t<path>[\t<new path>]`. Paths escape spaces
//! and non-printable bytes as a backslash followed by four octal digits.

use crate::common::{EntryType, EventKind, RawChangeEvent};
use crate::error::{DiffError, Result};

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

/// Parses every non-empty line of `output`.
pub fn parse_diff_output(output: &str) -> Result<Vec<RawChangeEvent>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_diff_line)
        .collect()
}

/// Parses a single line of diff output.
pub fn parse_diff_line(line: &str) -> Result<RawChangeEvent> {
    let malformed = || DiffError::DiffFacility(format!("malformed diff line: {line:?}"));

    let mut fields = line.split('\t');
    let change = fields.next().ok_or_else(malformed)?;
    let kind = match change {
        "+" => EventKind::Created,
        "-" => EventKind::Removed,
        "M" => EventKind::Modified,
        "R" => EventKind::Renamed,
        _ => return Err(malformed()),
    };
    let entry_type = match fields.next().ok_or_else(malformed)? {
        "/" => EntryType::Directory,
        t if t.len() == 1 => EntryType::File,
        _ => return Err(malformed()),
    };
    let path = fields.next().filter(|p| !p.is_empty()).ok_or_else(malformed)?;
    let new_path = fields.next();

    if fields.next().is_some() {
        return Err(malformed());
    }

    match (kind, new_path) {
        (EventKind::Renamed, Some(to)) if !to.is_empty() => {
            Ok(RawChangeEvent::renamed(entry_type, unescape(path), unescape(to)))
        }
        (EventKind::Renamed, _) | (_, Some(_)) => Err(malformed()),
        (kind, None) => Ok(RawChangeEvent::new(kind, entry_type, unescape(path))),
    }
}

/// Decodes `\NNNN` octal escapes into raw bytes.
fn unescape(raw: &str) -> PathBuf {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(byte) = octal_escape(&bytes[i + 1..]) {
                out.push(byte);
                i += 5;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    PathBuf::from(OsString::from_vec(out))
}

fn octal_escape(rest: &[u8]) -> Option<u8> {
    let digits = rest.get(..4)?;
    if !digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
        return None;
    }
    let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
    u8::try_from(value).ok()
}
