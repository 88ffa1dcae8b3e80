//! User Directory
//! Mission: Store user accounts with SQLite and verify credentials

use crate::auth::models::{AuthUser, Role};
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::{info, warn};
use uuid::Uuid;

/// Collaborator boundary: validates a credential pair.
///
/// Returns the matched user when the password validates, regardless of
/// account state. Deactivation is checked by the session layer only after
/// the password matched, so account status never leaks before password
/// verification.
pub trait CredentialVerifier: Send + Sync {
    fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<AuthUser>>;
}

/// Collaborator boundary: user-record lookups and session timestamps.
pub trait UserDirectory: Send + Sync {
    fn find_by_id(&self, id: &Uuid) -> Result<Option<AuthUser>>;
    fn record_login(&self, id: &Uuid) -> Result<()>;
    fn record_logout(&self, id: &Uuid) -> Result<()>;
}

/// User storage with SQLite backend
pub struct SqliteUserStore {
    db_path: String,
}

impl SqliteUserStore {
    /// Create a new user store and initialize the schema
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_login_at TEXT,
                last_logout_at TEXT
            )",
            [],
        )?;

        self.create_default_admin(&conn)?;

        Ok(())
    }

    /// Create default admin user for initial setup
    fn create_default_admin(&self, conn: &Connection) -> Result<()> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;

        if count == 0 {
            let password_hash =
                hash("admin123", DEFAULT_COST).context("Failed to hash password")?;

            conn.execute(
                "INSERT INTO users (id, name, email, password_hash, role, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    "Administrator",
                    "admin@caregate.local",
                    password_hash,
                    Role::Admin.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert admin user")?;

            info!("🔐 Default admin user created (email: admin@caregate.local, password: admin123)");
            warn!("⚠️  CHANGE DEFAULT PASSWORD IN PRODUCTION!");
        }

        Ok(())
    }

    fn map_user(row: &Row) -> rusqlite::Result<AuthUser> {
        let id_str: String = row.get(0)?;
        let role_str: String = row.get(4)?;
        let is_active: i64 = row.get(5)?;

        Ok(AuthUser {
            id: Uuid::parse_str(&id_str).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: Role::from_str(&role_str).unwrap_or(Role::Patient),
            is_active: is_active != 0,
            created_at: row.get(6)?,
            last_login_at: row.get(7)?,
            last_logout_at: row.get(8)?,
        })
    }

    const SELECT_COLS: &'static str = "id, name, email, password_hash, role, is_active, \
                                       created_at, last_login_at, last_logout_at";

    /// Get user by email
    pub fn find_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE email = ?1",
            Self::SELECT_COLS
        ))?;

        match stmt.query_row(params![email], Self::map_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a new user
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<AuthUser> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;

        let user = AuthUser {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
            role,
            is_active: true,
            created_at: Utc::now().to_rfc3339(),
            last_login_at: None,
            last_logout_at: None,
        };

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO users (id, name, email, password_hash, role, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!(email = %user.email, role = user.role.as_str(), "Created user");

        Ok(user)
    }

    /// List all users
    pub fn list_users(&self) -> Result<Vec<AuthUser>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt =
            conn.prepare(&format!("SELECT {} FROM users", Self::SELECT_COLS))?;

        let users = stmt
            .query_map([], Self::map_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Rename a user
    pub fn update_name(&self, id: &Uuid, name: &str) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        let rows = conn.execute(
            "UPDATE users SET name = ?1 WHERE id = ?2",
            params![name, id.to_string()],
        )?;

        if rows == 0 {
            anyhow::bail!("User not found");
        }
        Ok(())
    }

    /// Flip the active flag (deactivate/activate)
    pub fn set_active(&self, id: &Uuid, active: bool) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        let rows = conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active as i64, id.to_string()],
        )?;

        if rows == 0 {
            anyhow::bail!("User not found");
        }

        info!(user_id = %id, active, "Updated account state");
        Ok(())
    }

    /// Delete a user by ID
    pub fn delete_user(&self, id: &Uuid) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id.to_string()])?;

        if rows == 0 {
            anyhow::bail!("User not found");
        }

        info!(user_id = %id, "Deleted user");
        Ok(())
    }

    fn stamp(&self, id: &Uuid, column: &str) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            &format!("UPDATE users SET {column} = ?1 WHERE id = ?2"),
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }
}

impl CredentialVerifier for SqliteUserStore {
    fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<AuthUser>> {
        match self.find_by_email(email)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid.then_some(user))
            }
            None => Ok(None),
        }
    }
}

impl UserDirectory for SqliteUserStore {
    fn find_by_id(&self, id: &Uuid) -> Result<Option<AuthUser>> {
        let conn = Connection::open(&self.db_path)?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users WHERE id = ?1",
            Self::SELECT_COLS
        ))?;

        match stmt.query_row(params![id.to_string()], Self::map_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_login(&self, id: &Uuid) -> Result<()> {
        self.stamp(id, "last_login_at")
    }

    fn record_logout(&self, id: &Uuid) -> Result<()> {
        self.stamp(id, "last_logout_at")
    }
}
