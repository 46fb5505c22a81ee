use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::{FromRow, PgPool};
use thiserror::Error;

use crate::user::model::User;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("无效的用户记录: {0}")]
    InvalidRecord(String),
}

/// 用户存储。`save` 在 id 为 0 时插入，否则按 id 更新
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<User>, RepositoryError>;

    async fn save(&self, user: &User) -> Result<User, RepositoryError>;

    /// 返回是否删除了记录
    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError>;
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    user_id: String,
    first_name: String,
    last_name: String,
    username: String,
    password: String,
    email: String,
    profile_image_url: String,
    last_login_date: Option<DateTime<Utc>>,
    last_login_date_display: Option<DateTime<Utc>>,
    join_date: DateTime<Utc>,
    role: String,
    authorities: Vec<String>,
    is_active: bool,
    is_not_locked: bool,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|e| RepositoryError::InvalidRecord(format!("用户 {}: {}", row.username, e)))?;
        Ok(User {
            id: row.id,
            user_id: row.user_id,
            first_name: row.first_name,
            last_name: row.last_name,
            username: row.username,
            password: row.password,
            email: row.email,
            profile_image_url: row.profile_image_url,
            last_login_date: row.last_login_date,
            last_login_date_display: row.last_login_date_display,
            join_date: row.join_date,
            role,
            authorities: row.authorities,
            is_active: row.is_active,
            is_not_locked: row.is_not_locked,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT id, user_id, first_name, last_name, username, password, email,
           profile_image_url, last_login_date, last_login_date_display, join_date,
           role, authorities, is_active, is_not_locked
    FROM users
"#;

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 初始化用户表
    pub async fn init_schema(&self) -> Result<(), RepositoryError> {
        info!("开始初始化用户表...");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                user_id VARCHAR NOT NULL UNIQUE,
                first_name VARCHAR NOT NULL,
                last_name VARCHAR NOT NULL,
                username VARCHAR NOT NULL UNIQUE,
                password VARCHAR NOT NULL,
                email VARCHAR NOT NULL UNIQUE,
                profile_image_url VARCHAR NOT NULL DEFAULT '',
                last_login_date TIMESTAMPTZ,
                last_login_date_display TIMESTAMPTZ,
                join_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                role VARCHAR NOT NULL DEFAULT 'ROLE_USER',
                authorities TEXT[] NOT NULL DEFAULT '{}',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                is_not_locked BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("用户表初始化完成");
        Ok(())
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("{} WHERE {} = $1", SELECT_USER, column);
        sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        debug!("按用户名查询用户: {}", username);
        self.fetch_one_by("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        debug!("按邮箱查询用户: {}", email);
        self.fetch_one_by("email", email).await
    }

    async fn find_all(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("{} ORDER BY id", SELECT_USER);
        sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn save(&self, user: &User) -> Result<User, RepositoryError> {
        let row = if user.id == 0 {
            debug!("插入新用户: {}", user.username);
            sqlx::query_as::<_, UserRow>(
                r#"
                INSERT INTO users (user_id, first_name, last_name, username, password, email,
                    profile_image_url, last_login_date, last_login_date_display, join_date,
                    role, authorities, is_active, is_not_locked)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                RETURNING *
                "#,
            )
        } else {
            debug!("更新用户: {} (id={})", user.username, user.id);
            sqlx::query_as::<_, UserRow>(
                r#"
                UPDATE users SET user_id = $1, first_name = $2, last_name = $3, username = $4,
                    password = $5, email = $6, profile_image_url = $7, last_login_date = $8,
                    last_login_date_display = $9, join_date = $10, role = $11,
                    authorities = $12, is_active = $13, is_not_locked = $14
                WHERE id = $15
                RETURNING *
                "#,
            )
        };

        let mut query = row
            .bind(&user.user_id)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.username)
            .bind(&user.password)
            .bind(&user.email)
            .bind(&user.profile_image_url)
            .bind(user.last_login_date)
            .bind(user.last_login_date_display)
            .bind(user.join_date)
            .bind(user.role.name())
            .bind(&user.authorities)
            .bind(user.is_active)
            .bind(user.is_not_locked);
        if user.id != 0 {
            query = query.bind(user.id);
        }

        query.fetch_one(&self.pool).await?.try_into()
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
