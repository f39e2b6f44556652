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

//! Errors shared by every storage

use std::io;
use thiserror::Error;

use crate::codec::InvalidKey;

/// Result of a storage operation
pub type StorageResult<T> = Result<T, StorageError>;

/// What went wrong in a storage operation
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key (or a metastore row it resolves to) is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// A metadata row would violate a natural-key uniqueness constraint,
    /// or an initialization is already under way
    #[error("conflict: {0}")]
    Conflict(String),

    /// Path or object key does not decode into a key of the expected shape
    #[error("invalid key {0}")]
    InvalidKey(#[from] InvalidKey),

    /// The store has not finished initialization; carries its current state
    #[error("storage is not ready: {0}")]
    NotReady(String),

    /// The backend refused the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Local filesystem or stream failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Blob backend unreachable, misconfigured or failing
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Relational metastore failure
    #[error("metastore error: {0}")]
    Metastore(String),

    /// A request did not complete in time
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Anything else, with its cause chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Missing key or row
    pub fn not_found(what: impl Into<String>) -> Self {
        StorageError::NotFound(what.into())
    }

    /// Uniqueness or state conflict
    pub fn conflict(msg: impl Into<String>) -> Self {
        StorageError::Conflict(msg.into())
    }

    /// Rejected `path`
    pub fn invalid_key(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::InvalidKey(InvalidKey::new(path, reason))
    }

    /// Store not ready; `state` describes where it stands
    pub fn not_ready(state: impl Into<String>) -> Self {
        StorageError::NotReady(state.into())
    }

    /// Access refused by the backend
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        StorageError::PermissionDenied(msg.into())
    }

    /// Backend failure
    pub fn backend(msg: impl Into<String>) -> Self {
        StorageError::Backend(msg.into())
    }

    /// Metastore failure
    pub fn metastore(msg: impl Into<String>) -> Self {
        StorageError::Metastore(msg.into())
    }

    /// Timed-out request
    pub fn timeout(msg: impl Into<String>) -> Self {
        StorageError::Timeout(msg.into())
    }

    /// Wrap any error
    pub fn other<E: Into<anyhow::Error>>(error: E) -> Self {
        StorageError::Other(error.into())
    }

    /// `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// `Conflict`
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }

    /// `InvalidKey`
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, StorageError::InvalidKey(_))
    }

    /// `NotReady`
    pub fn is_not_ready(&self) -> bool {
        matches!(self, StorageError::NotReady(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("metastore row".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => StorageError::Timeout("metastore pool".to_string()),
            other => StorageError::Metastore(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StorageError::not_found("avatars/users/alice.png");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: avatars/users/alice.png");
    }

    #[test]
    fn test_not_ready_error() {
        let err = StorageError::not_ready("initializing");
        assert!(err.is_not_ready());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "storage is not ready: initializing");
    }

    #[test]
    fn test_invalid_key_conversion() {
        let err = StorageError::from(InvalidKey::new("a/b", "expected 4 segments, got 2"));
        assert!(err.is_invalid_key());
        assert_eq!(err.to_string(), "invalid key `a/b`: expected 4 segments, got 2");
        match err {
            StorageError::InvalidKey(invalid) => assert_eq!(invalid.path(), "a/b"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = StorageError::from(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::other("read failed");
        let storage_err = StorageError::from(io_err);
        assert!(matches!(storage_err, StorageError::Io(_)));
    }
}
