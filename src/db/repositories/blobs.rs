use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::db::{helpers::parse_datetime, Database};

#[derive(Debug, Clone, PartialEq)]
pub struct BlobRecord {
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    pub async fn get_blob(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM blobs WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            raw.map(|text| {
                serde_json::from_str(&text)
                    .with_context(|| format!("blob '{key}' is not valid JSON"))
            })
            .transpose()
        })
        .await
    }

    /// Upserts every entry inside one transaction.
    pub async fn put_blobs(
        &self,
        entries: Vec<(String, Value)>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                )?;
                for (key, value) in &entries {
                    let text = serde_json::to_string(value)?;
                    stmt.execute(params![key, text, updated_at.to_rfc3339()])
                        .with_context(|| format!("failed to write blob '{key}'"))?;
                }
            }
            tx.commit().context("failed to commit blob batch")?;
            Ok(())
        })
        .await
    }

    pub async fn list_blobs(&self) -> Result<Vec<BlobRecord>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value, updated_at FROM blobs ORDER BY key")?;
            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let text: String = row.get(1)?;
                let updated_at: String = row.get(2)?;
                records.push(BlobRecord {
                    value: serde_json::from_str(&text)
                        .with_context(|| format!("blob '{key}' is not valid JSON"))?,
                    updated_at: parse_datetime(&updated_at, "updated_at")?,
                    key,
                });
            }
            Ok(records)
        })
        .await
    }
}
