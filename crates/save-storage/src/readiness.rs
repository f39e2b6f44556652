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

//! Startup readiness of stores with asynchronous initialization
//!
//! `Uninitialized -> Initializing -> Ready`, or `Failed` from `Initializing`.
//! A failed store may be initialized again. The state lives in a `watch`
//! channel so health checks can wait for completion instead of polling.

use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

use crate::error::{StorageError, StorageResult};

/// Lifecycle of an initializing store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum InitState {
    /// Initialization has not started
    Uninitialized,
    /// Initialization is running
    Initializing,
    /// Initialization completed
    Ready,
    /// Initialization failed with the given reason
    Failed(String),
}

impl fmt::Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitState::Uninitialized => f.write_str("uninitialized"),
            InitState::Initializing => f.write_str("initializing"),
            InitState::Ready => f.write_str("ready"),
            InitState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Observable [`InitState`] owned by one store
#[derive(Debug)]
pub struct Readiness {
    state: watch::Sender<InitState>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    /// Start in `Uninitialized`
    pub fn new() -> Self {
        let (state, _) = watch::channel(InitState::Uninitialized);
        Readiness { state }
    }

    /// Start in `Initializing`, for work spawned at construction
    pub fn initializing() -> Self {
        let (state, _) = watch::channel(InitState::Initializing);
        Readiness { state }
    }

    /// Current state
    pub fn state(&self) -> InitState {
        self.state.borrow().clone()
    }

    /// Whether initialization completed
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == InitState::Ready
    }

    /// Move to `Initializing`
    ///
    /// Fails with `Conflict` when initialization is already running or done.
    pub fn begin(&self) -> StorageResult<()> {
        let mut previous = None;
        let started = self.state.send_if_modified(|state| match state {
            InitState::Uninitialized | InitState::Failed(_) => {
                *state = InitState::Initializing;
                true
            }
            other => {
                previous = Some(other.clone());
                false
            }
        });
        if started {
            Ok(())
        } else {
            Err(StorageError::conflict(format!(
                "initialization already {}",
                previous.unwrap_or(InitState::Initializing)
            )))
        }
    }

    /// Move to `Ready`
    pub fn mark_ready(&self) {
        self.state.send_replace(InitState::Ready);
    }

    /// Move to `Failed`
    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.state.send_replace(InitState::Failed(reason.into()));
    }

    /// `NotReady` unless initialization completed
    pub fn ensure_ready(&self) -> StorageResult<()> {
        match &*self.state.borrow() {
            InitState::Ready => Ok(()),
            other => Err(StorageError::not_ready(other.to_string())),
        }
    }

    /// Wait until the store is `Ready` (Ok) or `Failed` (`NotReady`)
    pub async fn wait_ready(&self) -> StorageResult<()> {
        let mut receiver = self.state.subscribe();
        let settled = receiver
            .wait_for(|state| matches!(state, InitState::Ready | InitState::Failed(_)))
            .await
            .map_err(|_| StorageError::not_ready("readiness channel closed"))?;
        match &*settled {
            InitState::Ready => Ok(()),
            other => Err(StorageError::not_ready(other.to_string())),
        }
    }
}
