//! Durable record sink
//!
//! Each completed flow produces exactly one record. The sink is the
//! narrow `write(draft) -> record id` seam the flow engine completes
//! through; the default implementation is a `records` table row with
//! the collected fields as JSON.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use serde_json::{Map, Value};
use sitedesk_protocol::{new_id, RecordType, SiteContext};
use tokio::task;

use crate::db;
use crate::error::EngineError;

/// The single durable write representing a whole collected flow.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub record_type: RecordType,
    pub site: Option<SiteContext>,
    pub fields: Map<String, Value>,
}

impl RecordDraft {
    pub fn new(record_type: RecordType, site: Option<SiteContext>) -> Self {
        Self {
            record_type,
            site,
            fields: Map::new(),
        }
    }

    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, draft: RecordDraft) -> Result<String, EngineError>;
}

pub struct SqliteRecordSink {
    db_path: PathBuf,
}

impl SqliteRecordSink {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl RecordSink for SqliteRecordSink {
    async fn write(&self, draft: RecordDraft) -> Result<String, EngineError> {
        let db_path = self.db_path.clone();
        let id = new_id();
        let record_id = id.clone();
        let record_type = draft.record_type.as_str();
        let site_id = draft.site.as_ref().map(|s| s.site_id.clone());
        let mut fields = draft.fields;
        if let Some(site) = &draft.site {
            fields.insert("site".into(), Value::String(site.site_id.clone()));
            fields.insert("site_name".into(), Value::String(site.site_name.clone()));
        }
        let fields = serde_json::to_string(&Value::Object(fields))?;
        let created_at = Utc::now().to_rfc3339();

        task::spawn_blocking(move || -> Result<(), EngineError> {
            let conn = db::open(&db_path)?;
            conn.execute(
                "INSERT INTO records (id, record_type, site_id, fields, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, record_type, site_id, fields, created_at],
            )?;
            Ok(())
        })
        .await??;

        Ok(record_id)
    }
}
