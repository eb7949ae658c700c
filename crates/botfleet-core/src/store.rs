// ABOUTME: Persistent tenant bot configuration, consulted at boot and on admin edits.
// ABOUTME: ConfigStore trait plus a SQLite implementation backed by sqlx.

use crate::config::{TenantConfig, TenantId, TenantUpdate, Templates};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::debug;

/// Source of truth for tenant bot configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Configuration for one tenant, if it has ever been stored.
    async fn get(&self, tenant_id: &TenantId) -> StoreResult<Option<TenantConfig>>;

    /// Every tenant whose bot should run at boot.
    async fn list_enabled(&self) -> StoreResult<Vec<TenantConfig>>;

    /// Apply a partial update, creating the tenant with defaults if needed.
    async fn upsert(&self, tenant_id: &TenantId, update: TenantUpdate) -> StoreResult<TenantConfig>;
}

/// Tenant config store backed by SQLite.
#[derive(Clone)]
pub struct SqliteConfigStore {
    pool: Pool<Sqlite>,
}

const SELECT_COLUMNS: &str =
    "SELECT tenant_id, is_enabled, display_name, secret_token, welcome_message, image_url FROM tenant_bots";

impl SqliteConfigStore {
    /// Open or create the store at the given path.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        debug!(path = %path.display(), "Tenant config store opened");
        Ok(store)
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_bots (
                tenant_id TEXT PRIMARY KEY,
                is_enabled INTEGER NOT NULL DEFAULT 0,
                display_name TEXT NOT NULL,
                secret_token TEXT,
                welcome_message TEXT NOT NULL,
                image_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tenant_bots_enabled ON tenant_bots(is_enabled);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn config_from_row(row: &SqliteRow) -> StoreResult<TenantConfig> {
    Ok(TenantConfig {
        tenant_id: TenantId::new(row.try_get::<String, _>("tenant_id")?),
        is_enabled: row.try_get::<i64, _>("is_enabled")? != 0,
        display_name: row.try_get("display_name")?,
        secret_token: row.try_get("secret_token")?,
        templates: Templates {
            welcome_message: row.try_get("welcome_message")?,
            image_url: row.try_get("image_url")?,
        },
    })
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get(&self, tenant_id: &TenantId) -> StoreResult<Option<TenantConfig>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tenant_id = ?"))
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(config_from_row).transpose()
    }

    async fn list_enabled(&self) -> StoreResult<Vec<TenantConfig>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE is_enabled = 1 ORDER BY tenant_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(config_from_row).collect()
    }

    async fn upsert(&self, tenant_id: &TenantId, update: TenantUpdate) -> StoreResult<TenantConfig> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!("{SELECT_COLUMNS} WHERE tenant_id = ?"))
            .bind(tenant_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let mut config = match existing.as_ref() {
            Some(row) => config_from_row(row)?,
            None => TenantConfig::new(tenant_id.clone()),
        };
        config.apply(update);

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO tenant_bots
                (tenant_id, is_enabled, display_name, secret_token, welcome_message, image_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tenant_id) DO UPDATE SET
                is_enabled = excluded.is_enabled,
                display_name = excluded.display_name,
                secret_token = excluded.secret_token,
                welcome_message = excluded.welcome_message,
                image_url = excluded.image_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.tenant_id.as_str())
        .bind(config.is_enabled)
        .bind(&config.display_name)
        .bind(&config.secret_token)
        .bind(&config.templates.welcome_message)
        .bind(&config.templates.image_url)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(tenant_id = %tenant_id, "Tenant config saved");
        Ok(config)
    }
}
