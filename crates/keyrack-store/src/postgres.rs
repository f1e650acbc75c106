//! PostgreSQL store.
//!
//! Entities live in `clients`, `groups`, and `secrets`; membership is an
//! explicit edge table pair — `memberships (client_id, group_id)` and
//! `accesses (group_id, secret_id)` — with composite primary keys. The
//! primary keys make idempotent mutation a plain `ON CONFLICT DO NOTHING`
//! upsert, and serialize concurrent re-application of the same edge.
//!
//! Feature-gated behind `postgres-store`. Uses `sqlx` with the Tokio
//! runtime for fully async operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;

use crate::model::{Client, Group, Secret};
use crate::{AclStore, ClientRegistry, GroupStore, SecretStore, StoreError};

type ClientRow = (i64, String, String, DateTime<Utc>, DateTime<Utc>, bool, bool);
type GroupRow = (
    i64,
    String,
    String,
    Json<HashMap<String, String>>,
    DateTime<Utc>,
    DateTime<Utc>,
);
type SecretRow = (
    i64,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Json<HashMap<String, String>>,
);

const SECRET_COLUMNS: &str = "id, name, content, checksum, created_at, updated_at, metadata";

fn client_from_row(row: ClientRow) -> Client {
    let (id, name, description, created_at, updated_at, enabled, automation_allowed) = row;
    Client {
        id,
        name,
        description,
        created_at,
        updated_at,
        enabled,
        automation_allowed,
    }
}

fn group_from_row(row: GroupRow) -> Group {
    let (id, name, description, Json(metadata), created_at, updated_at) = row;
    Group {
        id,
        name,
        description,
        metadata,
        created_at,
        updated_at,
    }
}

fn secret_from_row(row: SecretRow) -> Secret {
    let (id, name, content, checksum, created_at, updated_at, Json(metadata)) = row;
    Secret {
        id,
        name,
        content,
        checksum,
        created_at,
        updated_at,
        metadata,
    }
}

/// A store backed by PostgreSQL.
///
/// Thread-safe via `PgPool`. All operations are fully async and bounded by
/// the pool's acquire timeout — a slow database surfaces as an error, not a
/// hang.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore")
            .field("pool", &"[PgPool]")
            .finish_non_exhaustive()
    }
}

impl PostgresStore {
    /// Connect to PostgreSQL and run the initial migration.
    ///
    /// Creates the entity and edge tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connect`] if the connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connect {
                url: database_url.to_owned(),
                reason: e.to_string(),
            })?;

        let migration = "\
            CREATE TABLE IF NOT EXISTS clients (\
                id                 BIGSERIAL   PRIMARY KEY, \
                name               TEXT        NOT NULL UNIQUE, \
                description        TEXT        NOT NULL DEFAULT '', \
                created_at         TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at         TIMESTAMPTZ NOT NULL DEFAULT now(), \
                enabled            BOOLEAN     NOT NULL DEFAULT true, \
                automation_allowed BOOLEAN     NOT NULL DEFAULT false\
            ); \
            CREATE TABLE IF NOT EXISTS groups (\
                id          BIGSERIAL   PRIMARY KEY, \
                name        TEXT        NOT NULL UNIQUE, \
                description TEXT        NOT NULL DEFAULT '', \
                metadata    JSONB       NOT NULL DEFAULT '{}', \
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()\
            ); \
            CREATE TABLE IF NOT EXISTS secrets (\
                id         BIGSERIAL   PRIMARY KEY, \
                name       TEXT        NOT NULL UNIQUE, \
                content    TEXT        NOT NULL, \
                checksum   TEXT        NOT NULL DEFAULT '', \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                metadata   JSONB       NOT NULL DEFAULT '{}'\
            ); \
            CREATE TABLE IF NOT EXISTS memberships (\
                client_id BIGINT NOT NULL REFERENCES clients (id) ON DELETE CASCADE, \
                group_id  BIGINT NOT NULL REFERENCES groups (id)  ON DELETE CASCADE, \
                PRIMARY KEY (client_id, group_id)\
            ); \
            CREATE TABLE IF NOT EXISTS accesses (\
                group_id  BIGINT NOT NULL REFERENCES groups (id)  ON DELETE CASCADE, \
                secret_id BIGINT NOT NULL REFERENCES secrets (id) ON DELETE CASCADE, \
                PRIMARY KEY (group_id, secret_id)\
            )";

        sqlx::raw_sql(migration)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Connect {
                url: database_url.to_owned(),
                reason: format!("migration failed: {e}"),
            })?;

        tracing::info!("postgres store connected and migrated");
        Ok(Self { pool })
    }

    /// Return a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ClientRegistry for PostgresStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Client>, StoreError> {
        let row: Option<ClientRow> = sqlx::query_as(
            "SELECT id, name, description, created_at, updated_at, enabled, automation_allowed \
             FROM clients WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Read {
            entity: format!("client '{name}'"),
            reason: e.to_string(),
        })?;

        Ok(row.map(client_from_row))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Client>, StoreError> {
        let row: Option<ClientRow> = sqlx::query_as(
            "SELECT id, name, description, created_at, updated_at, enabled, automation_allowed \
             FROM clients WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Read {
            entity: format!("client id {id}"),
            reason: e.to_string(),
        })?;

        Ok(row.map(client_from_row))
    }
}

#[async_trait::async_trait]
impl GroupStore for PostgresStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Group>, StoreError> {
        let row: Option<GroupRow> = sqlx::query_as(
            "SELECT id, name, description, metadata, created_at, updated_at \
             FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Read {
            entity: format!("group id {id}"),
            reason: e.to_string(),
        })?;

        Ok(row.map(group_from_row))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let row: Option<GroupRow> = sqlx::query_as(
            "SELECT id, name, description, metadata, created_at, updated_at \
             FROM groups WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Read {
            entity: format!("group '{name}'"),
            reason: e.to_string(),
        })?;

        Ok(row.map(group_from_row))
    }

    async fn create(
        &self,
        name: &str,
        description: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Group, StoreError> {
        let row: GroupRow = sqlx::query_as(
            "INSERT INTO groups (name, description, metadata) VALUES ($1, $2, $3) \
             RETURNING id, name, description, metadata, created_at, updated_at",
        )
        .bind(name)
        .bind(description)
        .bind(Json(metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Write {
            entity: format!("group '{name}'"),
            reason: e.to_string(),
        })?;

        Ok(group_from_row(row))
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        // Edge rows cascade via the foreign keys.
        sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Delete {
                entity: format!("group id {id}"),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Group>, StoreError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT id, name, description, metadata, created_at, updated_at \
             FROM groups ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::List {
            entity: "groups".to_owned(),
            reason: e.to_string(),
        })?;

        Ok(rows.into_iter().map(group_from_row).collect())
    }
}

#[async_trait::async_trait]
impl SecretStore for PostgresStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Secret>, StoreError> {
        let row: Option<SecretRow> =
            sqlx::query_as(&format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE name = $1"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Read {
                    entity: format!("secret '{name}'"),
                    reason: e.to_string(),
                })?;

        Ok(row.map(secret_from_row))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Secret>, StoreError> {
        let row: Option<SecretRow> =
            sqlx::query_as(&format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Read {
                    entity: format!("secret id {id}"),
                    reason: e.to_string(),
                })?;

        Ok(row.map(secret_from_row))
    }
}

#[async_trait::async_trait]
impl AclStore for PostgresStore {
    async fn enroll_client(&self, client_id: i64, group_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO memberships (client_id, group_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(client_id)
        .bind(group_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Write {
            entity: format!("membership ({client_id}, {group_id})"),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    async fn evict_client(&self, client_id: i64, group_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM memberships WHERE client_id = $1 AND group_id = $2")
            .bind(client_id)
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Delete {
                entity: format!("membership ({client_id}, {group_id})"),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn allow_access(&self, secret_id: i64, group_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accesses (group_id, secret_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(secret_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Write {
            entity: format!("access ({group_id}, {secret_id})"),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    async fn revoke_access(&self, secret_id: i64, group_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM accesses WHERE group_id = $1 AND secret_id = $2")
            .bind(group_id)
            .bind(secret_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Delete {
                entity: format!("access ({group_id}, {secret_id})"),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn clients_for_group(&self, group_id: i64) -> Result<Vec<Client>, StoreError> {
        let rows: Vec<ClientRow> = sqlx::query_as(
            "SELECT c.id, c.name, c.description, c.created_at, c.updated_at, \
                    c.enabled, c.automation_allowed \
             FROM clients c \
             JOIN memberships m ON m.client_id = c.id \
             WHERE m.group_id = $1",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::List {
            entity: format!("clients of group id {group_id}"),
            reason: e.to_string(),
        })?;

        Ok(rows.into_iter().map(client_from_row).collect())
    }

    async fn secrets_for_group(&self, group_id: i64) -> Result<Vec<Secret>, StoreError> {
        let rows: Vec<SecretRow> = sqlx::query_as(
            "SELECT s.id, s.name, s.content, s.checksum, s.created_at, s.updated_at, s.metadata \
             FROM secrets s \
             JOIN accesses a ON a.secret_id = s.id \
             WHERE a.group_id = $1",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::List {
            entity: format!("secrets of group id {group_id}"),
            reason: e.to_string(),
        })?;

        Ok(rows.into_iter().map(secret_from_row).collect())
    }

    async fn secret_for_client(
        &self,
        client_id: i64,
        secret_name: &str,
    ) -> Result<Option<Secret>, StoreError> {
        let row: Option<SecretRow> = sqlx::query_as(
            "SELECT s.id, s.name, s.content, s.checksum, s.created_at, s.updated_at, s.metadata \
             FROM secrets s \
             JOIN accesses a    ON a.secret_id = s.id \
             JOIN memberships m ON m.group_id = a.group_id \
             WHERE m.client_id = $1 AND s.name = $2 \
             LIMIT 1",
        )
        .bind(client_id)
        .bind(secret_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Read {
            entity: format!("secret '{secret_name}' for client id {client_id}"),
            reason: e.to_string(),
        })?;

        Ok(row.map(secret_from_row))
    }
}
