//! SQLite-backed user store (`users.db`).

use super::auth::{AuthToken, AuthTokenValue, CredentialHasher, PasswordCredentials};
use super::models::User;
use super::user_store::{AuthTokenStore, UserCredentialsStore, UserStore};
use crate::sqlite_persistence::{migrate, VersionedSchema};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

const USER_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    up: r#"
        CREATE TABLE IF NOT EXISTS user (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            sector_id TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            avatar TEXT,
            last_access INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_email ON user(email);

        CREATE TABLE IF NOT EXISTS user_group (
            user_id TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
            group_id TEXT NOT NULL,
            UNIQUE(user_id, group_id)
        );

        CREATE TABLE IF NOT EXISTS auth_token (
            user_id TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
            value TEXT NOT NULL UNIQUE,
            created INTEGER NOT NULL,
            last_used INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_auth_token_value ON auth_token(value);

        CREATE TABLE IF NOT EXISTS user_password_credentials (
            user_id TEXT PRIMARY KEY REFERENCES user(id) ON DELETE CASCADE,
            salt TEXT NOT NULL,
            hash TEXT NOT NULL,
            hasher TEXT NOT NULL,
            created INTEGER NOT NULL,
            last_tried INTEGER,
            last_used INTEGER
        );
    "#,
}];

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn system_time_to_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn secs_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).with_context(|| {
            format!("Failed to open user db at {:?}", db_path.as_ref())
        })?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn, USER_SCHEMAS).context("Failed to migrate user schema")?;
        info!("User store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn group_ids(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
        let mut stmt =
            conn.prepare("SELECT group_id FROM user_group WHERE user_id = ?1 ORDER BY group_id")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn user_from_row(conn: &Connection, row: &rusqlite::Row) -> Result<User> {
        let id: String = row.get(0)?;
        let last_access_secs: i64 = row.get(6)?;
        let last_access = DateTime::<Utc>::from_timestamp(last_access_secs, 0)
            .ok_or_else(|| anyhow!("Invalid last_access timestamp {}", last_access_secs))?;
        let group_ids = Self::group_ids(conn, &id)?;
        Ok(User {
            id,
            name: row.get(1)?,
            email: row.get(2)?,
            sector_id: row.get(3)?,
            group_ids,
            active: row.get::<_, i64>(4)? != 0,
            avatar: row.get(5)?,
            last_access,
        })
    }
}

impl UserStore for SqliteUserStore {
    fn upsert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (id, name, email, sector_id, active, avatar, last_access)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                sector_id = excluded.sector_id,
                active = excluded.active,
                avatar = excluded.avatar,
                last_access = excluded.last_access",
            params![
                user.id,
                user.name,
                user.email,
                user.sector_id,
                user.active as i64,
                user.avatar,
                user.last_access.timestamp(),
            ],
        )?;
        conn.execute("DELETE FROM user_group WHERE user_id = ?1", params![user.id])?;
        for group_id in &user.group_ids {
            conn.execute(
                "INSERT OR IGNORE INTO user_group (user_id, group_id) VALUES (?1, ?2)",
                params![user.id, group_id],
            )?;
        }
        Ok(())
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, sector_id, active, avatar, last_access
             FROM user WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![user_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::user_from_row(&conn, row)?)),
            None => Ok(None),
        }
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, sector_id, active, avatar, last_access
             FROM user WHERE email = ?1",
        )?;
        let mut rows = stmt.query(params![email])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::user_from_row(&conn, row)?)),
            None => Ok(None),
        }
    }

    fn fetch_all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, email, sector_id, active, avatar, last_access
             FROM user ORDER BY name",
        )?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(Self::user_from_row(&conn, row)?);
        }
        Ok(users)
    }

    fn touch_last_access(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE user SET last_access = ?1 WHERE id = ?2",
            params![now_secs(), user_id],
        )?;
        Ok(())
    }
}

impl UserCredentialsStore for SqliteUserStore {
    fn get_user_credentials(&self, user_id: &str) -> Result<Option<PasswordCredentials>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, salt, hash, hasher, created, last_tried, last_used
             FROM user_password_credentials WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                ))
            },
        )
        .optional()?
        .map(|(user_id, salt, hash, hasher, created, last_tried, last_used)| {
            Ok(PasswordCredentials {
                user_id,
                salt,
                hash,
                hasher: CredentialHasher::from_str(&hasher)?,
                created: secs_to_system_time(created),
                last_tried: last_tried.map(secs_to_system_time),
                last_used: last_used.map(secs_to_system_time),
            })
        })
        .transpose()
    }

    fn update_user_credentials(&self, credentials: PasswordCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO user_password_credentials
             (user_id, salt, hash, hasher, created, last_tried, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                credentials.user_id,
                credentials.salt,
                credentials.hash,
                credentials.hasher.to_string(),
                system_time_to_secs(credentials.created),
                credentials.last_tried.map(system_time_to_secs),
                credentials.last_used.map(system_time_to_secs),
            ],
        )?;
        Ok(())
    }
}

impl AuthTokenStore for SqliteUserStore {
    fn get_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM auth_token WHERE value = ?1",
                params![token.0],
                |row| {
                    Ok(AuthToken {
                        user_id: row.get(0)?,
                        value: AuthTokenValue(row.get(1)?),
                        created: secs_to_system_time(row.get(2)?),
                        last_used: row.get::<_, Option<i64>>(3)?.map(secs_to_system_time),
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let existing = self.get_auth_token(token)?;
        if existing.is_some() {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM auth_token WHERE value = ?1", params![token.0])?;
        }
        Ok(existing)
    }

    fn update_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE auth_token SET last_used = ?1 WHERE value = ?2",
            params![now_secs(), token.0],
        )?;
        Ok(())
    }

    fn add_auth_token(&self, token: AuthToken) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO auth_token (user_id, value, created, last_used) VALUES (?1, ?2, ?3, ?4)",
            params![
                token.user_id,
                token.value.0,
                system_time_to_secs(token.created),
                token.last_used.map(system_time_to_secs),
            ],
        )?;
        Ok(())
    }

    fn get_all_auth_tokens(&self, user_id: &str) -> Result<Vec<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, value, created, last_used FROM auth_token WHERE user_id = ?1",
        )?;
        let tokens = stmt
            .query_map(params![user_id], |row| {
                Ok(AuthToken {
                    user_id: row.get(0)?,
                    value: AuthTokenValue(row.get(1)?),
                    created: secs_to_system_time(row.get(2)?),
                    last_used: row.get::<_, Option<i64>>(3)?.map(secs_to_system_time),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }
}
