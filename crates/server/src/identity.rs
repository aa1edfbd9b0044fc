//! Identity resolution boundary
//!
//! Mapping an address to a role is an external concern (registration and
//! OTP verification happen elsewhere); the engine consumes the result
//! through this trait and trusts it.

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use sitedesk_protocol::{Identity, Role};
use tokio::task;

use crate::db;
use crate::error::EngineError;

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Option<Identity>, EngineError>;
}

/// Directory-table implementation backed by the `identities` table.
pub struct SqliteIdentityResolver {
    db_path: PathBuf,
}

impl SqliteIdentityResolver {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl IdentityResolver for SqliteIdentityResolver {
    async fn resolve(&self, address: &str) -> Result<Option<Identity>, EngineError> {
        let db_path = self.db_path.clone();
        let address = address.to_string();

        task::spawn_blocking(move || -> Result<Option<Identity>, EngineError> {
            let conn = db::open(&db_path)?;
            let row: Option<(String, i64, Option<String>)> = conn
                .query_row(
                    "SELECT role, verified, display_name FROM identities WHERE address = ?1",
                    params![address],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            Ok(row.and_then(|(role, verified, display_name)| {
                let role = match role.as_str() {
                    "admin" => Role::Admin,
                    "employee" => Role::Employee,
                    "customer" => Role::Customer,
                    _ => return None,
                };
                Some(Identity {
                    address,
                    role,
                    verified: verified != 0,
                    display_name,
                })
            }))
        })
        .await?
    }
}
