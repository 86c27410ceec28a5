//! User persistence port and its adapters.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::google::GoogleProfile;
use crate::user::{AuthUser, Role};

/// Port for user persistence operations.
///
/// The first user ever created becomes admin; both create operations
/// honor that.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<AuthUser>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>>;

    async fn find_by_google_id(
        &self,
        google_id: &str,
    ) -> Result<Option<AuthUser>>;

    /// Create a user with a password credential.
    async fn create_with_password(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<AuthUser>;

    /// Create a user from an identity provider profile, or refresh the
    /// name, avatar and last login of an existing one.
    async fn create_or_update_from_google(
        &self,
        profile: &GoogleProfile,
    ) -> Result<AuthUser>;

    async fn update_last_login(&self, id: &str) -> Result<()>;

    /// All users, most recently created first.
    async fn list_all(&self) -> Result<Vec<AuthUser>>;

    async fn update_role(
        &self,
        id: &str,
        role: Role,
    ) -> Result<Option<AuthUser>>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Row shape shared by every query; converted once at this boundary.
#[derive(sqlx::FromRow)]
struct UserRecord {
    id: String,
    email: String,
    google_id: Option<String>,
    password_hash: Option<String>,
    name: String,
    avatar_url: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    last_login_at: DateTime<Utc>,
}

impl From<UserRecord> for AuthUser {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            google_id: record.google_id,
            password_hash: record.password_hash,
            name: record.name,
            avatar_url: record.avatar_url,
            role: Role::from_db(&record.role),
            created_at: record.created_at,
            last_login_at: record.last_login_at,
        }
    }
}

const SELECT_USER: &str = r#"
    SELECT id, email, google_id, password_hash, name, avatar_url, role,
           created_at, last_login_at
    FROM users
"#;

/// PostgreSQL adapter.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by(
        &self,
        field: &str,
        value: &str,
    ) -> Result<Option<AuthUser>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "{SELECT_USER} WHERE {field} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(AuthUser::from))
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<AuthUser>> {
        self.find_by("id", id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        self.find_by("email", email).await
    }

    async fn find_by_google_id(
        &self,
        google_id: &str,
    ) -> Result<Option<AuthUser>> {
        self.find_by("google_id", google_id).await
    }

    async fn create_with_password(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<AuthUser> {
        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&mut *tx)
                .await?;
        let role = if count == 0 { Role::Admin } else { Role::User };

        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, email, password_hash, name, role,
                               created_at, last_login_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            RETURNING id, email, google_id, password_hash, name,
                      avatar_url, role, created_at, last_login_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record.into())
    }

    async fn create_or_update_from_google(
        &self,
        profile: &GoogleProfile,
    ) -> Result<AuthUser> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, UserRecord>(&format!(
            "{SELECT_USER} WHERE google_id = $1"
        ))
        .bind(&profile.sub)
        .fetch_optional(&mut *tx)
        .await?;

        let record = match existing {
            Some(_) => {
                sqlx::query_as::<_, UserRecord>(
                    r#"
                    UPDATE users
                    SET name = $2, avatar_url = $3, last_login_at = NOW()
                    WHERE google_id = $1
                    RETURNING id, email, google_id, password_hash, name,
                              avatar_url, role, created_at, last_login_at
                    "#,
                )
                .bind(&profile.sub)
                .bind(&profile.name)
                .bind(&profile.picture)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                let (count,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM users")
                        .fetch_one(&mut *tx)
                        .await?;
                let role =
                    if count == 0 { Role::Admin } else { Role::User };

                sqlx::query_as::<_, UserRecord>(
                    r#"
                    INSERT INTO users (id, email, google_id, name,
                                       avatar_url, role, created_at,
                                       last_login_at)
                    VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
                    RETURNING id, email, google_id, password_hash, name,
                              avatar_url, role, created_at, last_login_at
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&profile.email)
                .bind(&profile.sub)
                .bind(&profile.name)
                .bind(&profile.picture)
                .bind(role.as_str())
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;
        Ok(record.into())
    }

    async fn update_last_login(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<AuthUser>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "{SELECT_USER} ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(AuthUser::from).collect())
    }

    async fn update_role(
        &self,
        id: &str,
        role: Role,
    ) -> Result<Option<AuthUser>> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users SET role = $2 WHERE id = $1
            RETURNING id, email, google_id, password_hash, name,
                      avatar_url, role, created_at, last_login_at
            "#,
        )
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(AuthUser::from))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory adapter for development and tests.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<String, AuthUser>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, AuthUser>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<AuthUser>> {
        Ok(self.guard().get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        Ok(self
            .guard()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_by_google_id(
        &self,
        google_id: &str,
    ) -> Result<Option<AuthUser>> {
        Ok(self
            .guard()
            .values()
            .find(|user| user.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn create_with_password(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<AuthUser> {
        let mut users = self.guard();
        let role = if users.is_empty() { Role::Admin } else { Role::User };
        let now = Utc::now();

        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            google_id: None,
            password_hash: Some(password_hash.to_owned()),
            name: name.to_owned(),
            avatar_url: None,
            role,
            created_at: now,
            last_login_at: now,
        };
        users.insert(user.id.clone(), user.clone());

        Ok(user)
    }

    async fn create_or_update_from_google(
        &self,
        profile: &GoogleProfile,
    ) -> Result<AuthUser> {
        let mut users = self.guard();
        let now = Utc::now();

        if let Some(user) = users
            .values_mut()
            .find(|user| user.google_id.as_deref() == Some(&profile.sub))
        {
            user.name = profile.name.clone();
            user.avatar_url = profile.picture.clone();
            user.last_login_at = now;
            return Ok(user.clone());
        }

        let role = if users.is_empty() { Role::Admin } else { Role::User };
        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: profile.email.clone(),
            google_id: Some(profile.sub.clone()),
            password_hash: None,
            name: profile.name.clone(),
            avatar_url: profile.picture.clone(),
            role,
            created_at: now,
            last_login_at: now,
        };
        users.insert(user.id.clone(), user.clone());

        Ok(user)
    }

    async fn update_last_login(&self, id: &str) -> Result<()> {
        if let Some(user) = self.guard().get_mut(id) {
            user.last_login_at = Utc::now();
        }

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<AuthUser>> {
        let mut users: Vec<_> = self.guard().values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(users)
    }

    async fn update_role(
        &self,
        id: &str,
        role: Role,
    ) -> Result<Option<AuthUser>> {
        let mut users = self.guard();
        match users.get_mut(id) {
            Some(user) => {
                user.role = role;
                Ok(Some(user.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.guard().remove(id).is_some())
    }
}
