// SAVE Storage - key-addressed blob storage
// Copyright (C) 2026 SAVE Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Key-path codec
//!
//! A [`KeyCodec`] maps a typed key to a [`KeyPath`] (ordered, validated path
//! segments) and back. The same path is used as a filesystem location relative
//! to a storage root and as an object-key suffix under an S3 prefix, so the
//! segment order and the `/` separator are part of the persisted addressing
//! scheme.
//!
//! Decoding returns `Result<Key, InvalidKey>`: listing code skips paths that
//! fail to decode, explicit lookups propagate the failure.

use std::fmt::{self, Debug, Display};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Separator between segments of an encoded key
pub const SEPARATOR: char = '/';

/// Segment prefix reserved for in-flight uploads of local storages
pub const RESERVED_PREFIX: &str = ".tmp-";

/// A path or object key that does not decode into a key of the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{path}`: {reason}")]
pub struct InvalidKey {
    path: String,
    reason: String,
}

impl InvalidKey {
    /// Create an error for `path` with a human-readable reason
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        InvalidKey {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The offending path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Why the path was rejected
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Ordered, validated path segments
///
/// Segments are never empty, never `.` or `..`, and never contain a separator
/// (`/` or `\`) or NUL, so joining them with `/` is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Build a path from segments, validating each one
    pub fn new<I, S>(segments: I) -> Result<Self, InvalidKey>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(InvalidKey::new("", "path has no segments"));
        }
        for segment in &segments {
            if let Err(reason) = validate_segment(segment) {
                return Err(InvalidKey::new(segments.join("/"), reason));
            }
        }
        Ok(KeyPath { segments })
    }

    /// Split a `/`-separated object key suffix
    pub fn parse(path: &str) -> Result<Self, InvalidKey> {
        if path.is_empty() {
            return Err(InvalidKey::new(path, "path is empty"));
        }
        KeyPath::new(path.split(SEPARATOR))
    }

    /// Convert a relative filesystem path into segments
    pub fn from_relative_path(path: &Path) -> Result<Self, InvalidKey> {
        let display = path.display().to_string();
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(part) => segments.push(part.to_string()),
                    None => return Err(InvalidKey::new(display, "path is not valid UTF-8")),
                },
                _ => return Err(InvalidKey::new(display, "path is not a plain relative path")),
            }
        }
        KeyPath::new(segments)
    }

    /// Segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; a key path has at least one segment
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Final segment (the file name on disk)
    pub fn file_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Require an exact segment count
    pub fn expect_len(&self, expected: usize) -> Result<&[String], InvalidKey> {
        if self.segments.len() == expected {
            Ok(&self.segments)
        } else {
            Err(self.invalid(format!(
                "expected {} segments, got {}",
                expected,
                self.segments.len()
            )))
        }
    }

    /// Require at least `min` segments
    pub fn expect_min_len(&self, min: usize) -> Result<&[String], InvalidKey> {
        if self.segments.len() >= min {
            Ok(&self.segments)
        } else {
            Err(self.invalid(format!(
                "expected at least {} segments, got {}",
                min,
                self.segments.len()
            )))
        }
    }

    /// Render as an object key suffix (`a/b/c`)
    pub fn as_object_key(&self) -> String {
        self.segments.join("/")
    }

    /// Render as a path relative to a storage root
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Prepend segments, e.g. a fixed sub-directory
    pub fn prefixed(&self, prefix: &KeyPath) -> KeyPath {
        let mut segments = prefix.segments.clone();
        segments.extend(self.segments.iter().cloned());
        KeyPath { segments }
    }

    /// Remove leading segments equal to `prefix`
    pub fn strip_prefix(&self, prefix: &KeyPath) -> Option<KeyPath> {
        if self.segments.len() <= prefix.segments.len()
            || !self.segments.starts_with(&prefix.segments)
        {
            return None;
        }
        Some(KeyPath {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// Error for this path
    pub fn invalid(&self, reason: impl Into<String>) -> InvalidKey {
        InvalidKey::new(self.as_object_key(), reason)
    }
}

impl Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_object_key())
    }
}

fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("empty path segment".to_string());
    }
    if segment == "." || segment == ".." {
        return Err(format!("relative path segment `{segment}`"));
    }
    if segment.starts_with(RESERVED_PREFIX) {
        return Err(format!("segment `{segment}` uses reserved prefix `{RESERVED_PREFIX}`"));
    }
    if let Some(c) = segment.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(format!("segment `{}` contains {:?}", segment, c));
    }
    Ok(())
}

/// Check a single user-supplied value before using it as a path segment
pub fn check_segment(value: &str, field: &str) -> Result<(), InvalidKey> {
    validate_segment(value).map_err(|reason| InvalidKey::new(value, format!("{field}: {reason}")))
}

/// Parse a segment into a typed field, failing loudly on malformed input
pub fn parse_segment<T>(path: &KeyPath, value: &str, field: &str) -> Result<T, InvalidKey>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| path.invalid(format!("{field} `{value}` is malformed: {e}")))
}

/// Parse an integer segment that must be in canonical decimal form
///
/// `007` would otherwise decode to the same key as `7` and break the
/// encode/decode inverse.
pub fn parse_canonical_i64(path: &KeyPath, value: &str, field: &str) -> Result<i64, InvalidKey> {
    let parsed: i64 = parse_segment(path, value, field)?;
    if parsed.to_string() != value {
        return Err(path.invalid(format!("{field} `{value}` is not in canonical form")));
    }
    Ok(parsed)
}

/// Bidirectional mapping between a typed key and its path
pub trait KeyCodec: Send + Sync + Debug + 'static {
    /// Key type addressed by this codec
    type Key: Clone + Debug + Send + Sync + 'static;

    /// Encode a key into path segments
    fn encode(&self, key: &Self::Key) -> Result<KeyPath, InvalidKey>;

    /// Decode path segments into a key
    fn decode(&self, path: &KeyPath) -> Result<Self::Key, InvalidKey>;

    /// Whether `path` is the encoding of some key of this kind
    fn is_key(&self, path: &KeyPath) -> bool {
        self.decode(path).is_ok()
    }
}

/// Single decimal segment holding a row id
///
/// Blob layout for metastore-backed storages.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdCodec;

impl KeyCodec for IdCodec {
    type Key = i64;

    fn encode(&self, key: &i64) -> Result<KeyPath, InvalidKey> {
        if *key < 0 {
            return Err(InvalidKey::new(key.to_string(), "id must not be negative"));
        }
        KeyPath::new([key.to_string()])
    }

    fn decode(&self, path: &KeyPath) -> Result<i64, InvalidKey> {
        let segments = path.expect_len(1)?;
        let id = parse_canonical_i64(path, &segments[0], "id")?;
        if id < 0 {
            return Err(path.invalid("id must not be negative"));
        }
        Ok(id)
    }
}
