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

//! SQLite directory of projects and test suites sources
//!
//! Holds the rows metastore-backed stores resolve foreign references
//! against, and the schema of their own tables.

use save_storage::{StorageError, StorageResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (organization, name)
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects (id),
    name TEXT NOT NULL,
    uploaded_millis INTEGER NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT -1,
    UNIQUE (project_id, name, uploaded_millis)
);

CREATE TABLE IF NOT EXISTS lnk_execution_file (
    execution_id INTEGER NOT NULL,
    file_id INTEGER NOT NULL REFERENCES files (id),
    PRIMARY KEY (execution_id, file_id)
);

CREATE TABLE IF NOT EXISTS test_suites_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (organization, name)
);

CREATE TABLE IF NOT EXISTS tests_source_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES test_suites_sources (id),
    commit_id TEXT NOT NULL,
    commit_time_millis INTEGER NOT NULL,
    UNIQUE (source_id, commit_id)
)
"#;

/// Project row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProjectRow {
    /// Row id
    pub id: i64,
    /// Owning organization
    pub organization: String,
    /// Project name
    pub name: String,
}

/// Test suites source row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TestSuitesSourceRow {
    /// Row id
    pub id: i64,
    /// Owning organization
    pub organization: String,
    /// Source name
    pub name: String,
}

/// Shared connection pool plus the domain lookups stores depend on
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    /// Connect to `url`, creating the database file if missing
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        info!(url, "Connected to metastore");
        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating missing tables
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        for stmt in statements {
            sqlx::query(stmt).execute(&pool).await?;
        }
        debug!("Metastore schema ready");
        Ok(SqliteDirectory { pool })
    }

    /// The shared pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a project; `Conflict` if it already exists
    pub async fn create_project(&self, organization: &str, name: &str) -> StorageResult<ProjectRow> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "INSERT INTO projects (organization, name) VALUES (?, ?) RETURNING id, organization, name",
        )
        .bind(organization)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        debug!(organization, project = name, id = row.id, "Created project");
        Ok(row)
    }

    /// Id of the project, if registered
    pub async fn find_project_id(&self, organization: &str, name: &str) -> StorageResult<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM projects WHERE organization = ? AND name = ?",
        )
        .bind(organization)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Id of the project, `NotFound` if it is not registered
    pub async fn require_project_id(&self, organization: &str, name: &str) -> StorageResult<i64> {
        self.find_project_id(organization, name)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("project {}/{}", organization, name)))
    }

    /// Register a test suites source; `Conflict` if it already exists
    pub async fn create_test_suites_source(
        &self,
        organization: &str,
        name: &str,
    ) -> StorageResult<TestSuitesSourceRow> {
        let row = sqlx::query_as::<_, TestSuitesSourceRow>(
            "INSERT INTO test_suites_sources (organization, name) VALUES (?, ?) \
             RETURNING id, organization, name",
        )
        .bind(organization)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        debug!(organization, source = name, id = row.id, "Created test suites source");
        Ok(row)
    }

    /// Id of the test suites source, if registered
    pub async fn find_test_suites_source_id(
        &self,
        organization: &str,
        name: &str,
    ) -> StorageResult<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM test_suites_sources WHERE organization = ? AND name = ?",
        )
        .bind(organization)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Id of the test suites source, `NotFound` if it is not registered
    pub async fn require_test_suites_source_id(
        &self,
        organization: &str,
        name: &str,
    ) -> StorageResult<i64> {
        self.find_test_suites_source_id(organization, name)
            .await?
            .ok_or_else(|| {
                StorageError::not_found(format!("test suites source {}/{}", organization, name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_test_utils::memory_pool;

    #[tokio::test]
    async fn test_projects() {
        let directory = SqliteDirectory::from_pool(memory_pool().await).await.unwrap();

        assert_eq!(directory.find_project_id("Huawei", "huaweiName").await.unwrap(), None);
        let row = directory.create_project("Huawei", "huaweiName").await.unwrap();
        assert_eq!(
            directory.find_project_id("Huawei", "huaweiName").await.unwrap(),
            Some(row.id)
        );

        let err = directory.create_project("Huawei", "huaweiName").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(directory.require_project_id("Huawei", "other").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_schema_is_reentrant() {
        let pool = memory_pool().await;
        let directory = SqliteDirectory::from_pool(pool.clone()).await.unwrap();
        directory.create_test_suites_source("org", "src").await.unwrap();

        let again = SqliteDirectory::from_pool(pool).await.unwrap();
        assert!(again.find_test_suites_source_id("org", "src").await.unwrap().is_some());
    }
}
