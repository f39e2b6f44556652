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

//! Avatars of organizations and users

use save_migration::{IdentityMapping, Migratable};
use save_storage::{
    delegate_storage, ContentStream, InvalidKey, KeyCodec, KeyPath, SharedStorage, Storage,
    StorageResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::root::{BlobRoot, LegacyRoot};

/// Store prefix
pub const AVATARS: &str = "avatars";

/// Owner kind of an avatar
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvatarType {
    /// Organization avatar
    Organization,
    /// User avatar
    User,
}

impl AvatarType {
    /// Directory holding avatars of this kind
    pub fn folder(self) -> &'static str {
        match self {
            AvatarType::Organization => "organizations",
            AvatarType::User => "users",
        }
    }

    fn from_folder(folder: &str) -> Option<Self> {
        match folder {
            "organizations" => Some(AvatarType::Organization),
            "users" => Some(AvatarType::User),
            _ => None,
        }
    }
}

/// One avatar: owner kind plus the owner's name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AvatarKey {
    /// Owner kind
    pub avatar_type: AvatarType,
    /// Name of the stored object
    pub object_name: String,
}

impl AvatarKey {
    /// Key for `object_name` of the given kind
    pub fn new(avatar_type: AvatarType, object_name: impl Into<String>) -> Self {
        AvatarKey {
            avatar_type,
            object_name: object_name.into(),
        }
    }
}

impl fmt::Display for AvatarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.avatar_type.folder(), self.object_name)
    }
}

/// `<type-folder>/<object-name>`
#[derive(Debug, Clone, Copy, Default)]
pub struct AvatarCodec;

impl KeyCodec for AvatarCodec {
    type Key = AvatarKey;

    fn encode(&self, key: &AvatarKey) -> Result<KeyPath, InvalidKey> {
        KeyPath::new([key.avatar_type.folder(), key.object_name.as_str()])
    }

    fn decode(&self, path: &KeyPath) -> Result<AvatarKey, InvalidKey> {
        let segments = path.expect_len(2)?;
        let avatar_type = AvatarType::from_folder(&segments[0])
            .ok_or_else(|| path.invalid(format!("unknown avatar folder '{}'", segments[0])))?;
        Ok(AvatarKey::new(avatar_type, segments[1].clone()))
    }
}

/// Avatar store, at most one object per key
#[derive(Debug)]
pub struct AvatarStorage {
    inner: SharedStorage<AvatarKey>,
    migration: Option<Arc<dyn Migratable>>,
}

delegate_storage!(AvatarStorage, inner, AvatarKey);

impl AvatarStorage {
    /// Store under `root`, migrating from `legacy` when given
    pub fn new(root: &BlobRoot, legacy: Option<&LegacyRoot>) -> StorageResult<Self> {
        let current = root.storage(AVATARS, AvatarCodec)?;
        match legacy {
            Some(legacy) => {
                let (inner, migration) =
                    legacy.migrate_into(AVATARS, AvatarCodec, IdentityMapping::new(), current)?;
                Ok(AvatarStorage {
                    inner,
                    migration: Some(migration),
                })
            }
            None => Ok(Self::from_storage(current)),
        }
    }

    /// Store over an existing storage, without migration
    pub fn from_storage(inner: SharedStorage<AvatarKey>) -> Self {
        AvatarStorage {
            inner,
            migration: None,
        }
    }

    /// Pending migration from the legacy layout, if any
    pub fn migration(&self) -> Option<Arc<dyn Migratable>> {
        self.migration.clone()
    }

    /// Replace the avatar stored under `key`
    pub async fn upload_avatar(&self, key: &AvatarKey, content: ContentStream) -> StorageResult<u64> {
        self.inner.upsert(key, content).await
    }

    /// Content of the avatar stored under `key`
    pub async fn download_avatar(&self, key: &AvatarKey) -> StorageResult<ContentStream> {
        self.inner.download(key).await
    }
}
