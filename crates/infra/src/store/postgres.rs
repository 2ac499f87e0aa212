//! Postgres-backed auth store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | any other | `Backend` |
//! | PoolClosed / network / decode | N/A | `Backend` |
//!
//! ## Atomicity
//!
//! `two_factor_verifications` and `reset_password_verifications` are keyed by
//! `user_id`, and issuance is a single `INSERT … ON CONFLICT (user_id) DO
//! UPDATE`, so a reissue can never leave two live artifacts. Password reset
//! completion deletes the link and writes the hash in one statement.
//! Registration inserts the identity, its role and its account link in one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use capita_auth::{
    Identity, IdentityStore, NewIdentity, Role, RoleStore, StoreError, StoreResult,
    VerificationCode, VerificationLink, VerificationStore, VerificationType, default_roles,
};
use capita_core::{RoleId, UserId};

const SCHEMA: &str = include_str!("schema.sql");

const IDENTITY_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, phone, enabled, locked, mfa_enabled, created_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, creates the schema if needed and seeds the default roles.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;

        for role in default_roles() {
            sqlx::query(
                r#"
                INSERT INTO roles (id, name, permission)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(role.id.as_uuid())
            .bind(&role.name)
            .bind(&role.permission)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("seed_roles", e))?;
        }
        info!("auth schema ready");
        Ok(())
    }

    async fn fetch_identity(&self, operation: &str, column: &str, bind: IdentityKey<'_>) -> StoreResult<Option<Identity>> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE {column} = $1");
        let query = sqlx::query(&sql);
        let query = match bind {
            IdentityKey::Id(id) => query.bind(id),
            IdentityKey::Email(email) => query.bind(email),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|r| identity_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

enum IdentityKey<'a> {
    Id(Uuid),
    Email(&'a str),
}

fn identity_from_row(row: &PgRow) -> Result<Identity, sqlx::Error> {
    Ok(Identity {
        id: UserId::from_uuid(row.try_get("id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        phone: row.try_get("phone")?,
        enabled: row.try_get("enabled")?,
        locked: row.try_get("locked")?,
        mfa_enabled: row.try_get("mfa_enabled")?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    Ok(Role {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        permission: row.try_get("permission")?,
    })
}

fn code_from_row(row: &PgRow) -> Result<VerificationCode, sqlx::Error> {
    Ok(VerificationCode {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        code: row.try_get("code")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn link_from_row(row: &PgRow, kind: VerificationType) -> Result<VerificationLink, sqlx::Error> {
    let expires_at: Option<DateTime<Utc>> = match kind {
        VerificationType::Password => row.try_get("expires_at")?,
        VerificationType::Account => None,
    };
    Ok(VerificationLink {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        key: row.try_get("url_key")?,
        url: row.try_get("url")?,
        kind,
        expires_at,
    })
}

#[async_trait]
impl IdentityStore for PostgresStore {
    /// Identity, role association and account link are written in one
    /// transaction; any failure rolls all three back.
    #[instrument(skip(self, new, account_link), fields(email = %new.email), err)]
    async fn register_identity(
        &self,
        new: NewIdentity,
        role_id: RoleId,
        account_link: VerificationLink,
    ) -> StoreResult<Identity> {
        let identity = new.into_identity();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO users
                (id, first_name, last_name, email, password_hash, phone, enabled, locked, mfa_enabled, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(identity.id.as_uuid())
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.phone)
        .bind(identity.enabled)
        .bind(identity.locked)
        .bind(identity.mfa_enabled)
        .bind(identity.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_identity", e))?;

        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
            .bind(identity.id.as_uuid())
            .bind(role_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_user_role", e))?;

        sqlx::query("INSERT INTO account_verifications (url_key, user_id, url) VALUES ($1, $2, $3)")
            .bind(&account_link.key)
            .bind(identity.id.as_uuid())
            .bind(&account_link.url)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_account_link", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(identity)
    }

    #[instrument(skip(self), err)]
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        self.fetch_identity("find_by_email", "email", IdentityKey::Email(email))
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, id: UserId) -> StoreResult<Option<Identity>> {
        self.fetch_identity("find_by_id", "id", IdentityKey::Id(*id.as_uuid()))
            .await
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("email_exists", e))
    }

    #[instrument(skip(self), err)]
    async fn enable_identity(&self, id: UserId) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET enabled = TRUE WHERE id = $1 AND enabled = FALSE")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("enable_identity", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn set_locked(&self, id: UserId, locked: bool) -> StoreResult<()> {
        sqlx::query("UPDATE users SET locked = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(locked)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_locked", e))?;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PostgresStore {
    async fn find_role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query("SELECT id, name, permission FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        row.map(|r| role_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_role_by_name", e))
    }

    #[instrument(skip(self), err)]
    async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET role_id = EXCLUDED.role_id
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;
        Ok(())
    }

    async fn role_for_user(&self, user_id: UserId) -> StoreResult<Option<Role>> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.name, r.permission
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_for_user", e))?;
        row.map(|r| role_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("role_for_user", e))
    }

    async fn role_for_email(&self, email: &str) -> StoreResult<Option<Role>> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.name, r.permission
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            JOIN users u ON u.id = ur.user_id
            WHERE u.email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_for_email", e))?;
        row.map(|r| role_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("role_for_email", e))
    }
}

#[async_trait]
impl VerificationStore for PostgresStore {
    #[instrument(skip(self, code), fields(user_id = %code.user_id), err)]
    async fn replace_mfa_code(&self, code: VerificationCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_verifications (user_id, code, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
                SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(code.user_id.as_uuid())
        .bind(&code.code)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("replace_mfa_code", e))?;
        Ok(())
    }

    async fn find_mfa_code(&self, code: &str) -> StoreResult<Option<VerificationCode>> {
        let row = sqlx::query("SELECT user_id, code, expires_at FROM two_factor_verifications WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_mfa_code", e))?;
        row.map(|r| code_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("find_mfa_code", e))
    }

    async fn mfa_code_for_user(&self, user_id: UserId) -> StoreResult<Option<VerificationCode>> {
        let row = sqlx::query("SELECT user_id, code, expires_at FROM two_factor_verifications WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("mfa_code_for_user", e))?;
        row.map(|r| code_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("mfa_code_for_user", e))
    }

    #[instrument(skip(self, code), err)]
    async fn delete_mfa_code(&self, code: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM two_factor_verifications WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_mfa_code", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, link), fields(user_id = %link.user_id), err)]
    async fn insert_account_link(&self, link: VerificationLink) -> StoreResult<()> {
        sqlx::query("INSERT INTO account_verifications (url_key, user_id, url) VALUES ($1, $2, $3)")
            .bind(&link.key)
            .bind(link.user_id.as_uuid())
            .bind(&link.url)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_account_link", e))?;
        Ok(())
    }

    async fn find_account_link(&self, key: &str) -> StoreResult<Option<VerificationLink>> {
        let row = sqlx::query("SELECT url_key, user_id, url FROM account_verifications WHERE url_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_account_link", e))?;
        row.map(|r| link_from_row(&r, VerificationType::Account))
            .transpose()
            .map_err(|e| map_sqlx_error("find_account_link", e))
    }

    #[instrument(skip(self, link), fields(user_id = %link.user_id), err)]
    async fn replace_reset_link(&self, link: VerificationLink) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reset_password_verifications (user_id, url_key, url, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
                SET url_key = EXCLUDED.url_key, url = EXCLUDED.url, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(link.user_id.as_uuid())
        .bind(&link.key)
        .bind(&link.url)
        .bind(link.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("replace_reset_link", e))?;
        Ok(())
    }

    async fn find_reset_link(&self, key: &str) -> StoreResult<Option<VerificationLink>> {
        let row = sqlx::query(
            "SELECT url_key, user_id, url, expires_at FROM reset_password_verifications WHERE url_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_reset_link", e))?;
        row.map(|r| link_from_row(&r, VerificationType::Password))
            .transpose()
            .map_err(|e| map_sqlx_error("find_reset_link", e))
    }

    #[instrument(skip(self, key, password_hash), err)]
    async fn complete_password_reset(&self, key: &str, password_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            WITH link AS (
                DELETE FROM reset_password_verifications WHERE url_key = $1 RETURNING user_id
            )
            UPDATE users SET password_hash = $2
            FROM link
            WHERE users.id = link.user_id
            "#,
        )
        .bind(key)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("complete_password_reset", e))?;
        Ok(result.rows_affected() == 1)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("{} failed: {}", operation, other)),
    }
}
