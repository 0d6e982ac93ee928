use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde_json::{json, Map, Value};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    ApiKey, ContentItem, ContentType, EditKind, ItemStatus, NewApiKey, NewSummaryEdit, Page,
    SummaryEdit, SystemPrompt,
};

use super::schema::SCHEMA;

const ITEM_COLUMNS: &str = "id, original_url, content_type, title, summary, original_content, tags, metadata, created_at, updated_at";
const ITEM_ORDER: &str = "ORDER BY created_at DESC, id DESC";

/// Handle to the SQLite store. Cloning is cheap; all clones share one
/// background connection.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Content item operations

    pub async fn insert_pending_item(&self, url: String, content_type: ContentType) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let metadata = json!({ "status": ItemStatus::Pending.as_str() }).to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO content_items (original_url, content_type, tags, metadata, created_at, updated_at)
                       VALUES (?1, ?2, '[]', ?3, ?4, ?4)"#,
                    params![url, content_type.as_str(), metadata, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<ContentItem>> {
        let item = self
            .conn
            .call(move |conn| {
                let item = conn
                    .query_row(
                        &format!("SELECT {} FROM content_items WHERE id = ?1", ITEM_COLUMNS),
                        params![id],
                        item_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }

    pub async fn list_items(&self, limit: i64, offset: i64) -> Result<Page<ContentItem>> {
        let page = self
            .conn
            .call(move |conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM content_items", [], |row| row.get(0))?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM content_items {} LIMIT ?1 OFFSET ?2",
                    ITEM_COLUMNS, ITEM_ORDER
                ))?;
                let items = stmt
                    .query_map(params![limit, offset], item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Page { items, total })
            })
            .await?;
        Ok(page)
    }

    /// Case-insensitive substring search over title and summary.
    pub async fn search_items(&self, query: &str, limit: i64, offset: i64) -> Result<Page<ContentItem>> {
        let pattern = format!("%{}%", escape_like(query.trim()));
        let page = self
            .conn
            .call(move |conn| {
                let filter = r#"WHERE title LIKE ?1 ESCAPE '\' OR summary LIKE ?1 ESCAPE '\'"#;
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM content_items {}", filter),
                    params![pattern],
                    |row| row.get(0),
                )?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM content_items {} {} LIMIT ?2 OFFSET ?3",
                    ITEM_COLUMNS, filter, ITEM_ORDER
                ))?;
                let items = stmt
                    .query_map(params![pattern, limit, offset], item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Page { items, total })
            })
            .await?;
        Ok(page)
    }

    /// Overwrite the summary. Returns the updated item, or `None` if it does
    /// not exist.
    pub async fn update_summary(&self, id: i64, summary: String) -> Result<Option<ContentItem>> {
        let now = Utc::now().to_rfc3339();
        let item = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE content_items SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                    params![summary, now, id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                let item = conn
                    .query_row(
                        &format!("SELECT {} FROM content_items WHERE id = ?1", ITEM_COLUMNS),
                        params![id],
                        item_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }

    pub async fn mark_processing(&self, id: i64) -> Result<()> {
        self.patch_metadata(id, vec![("status", json!(ItemStatus::Processing.as_str()))])
            .await
    }

    pub async fn record_extraction(
        &self,
        id: i64,
        title: String,
        original_content: String,
        channel_or_site: String,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE content_items SET title = ?1, original_content = ?2 WHERE id = ?3",
                    params![title, original_content, id],
                )?;
                apply_metadata_patch(&tx, id, &[("channel_or_site", json!(channel_or_site))])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn record_summary(&self, id: i64, summary: String, provider_used: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE content_items SET summary = ?1 WHERE id = ?2",
                    params![summary, id],
                )?;
                apply_metadata_patch(
                    &tx,
                    id,
                    &[
                        ("status", json!(ItemStatus::Completed.as_str())),
                        ("provider_used", json!(provider_used)),
                        ("error", Value::Null),
                        ("error_code", Value::Null),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, code: &str, message: &str) -> Result<()> {
        self.patch_metadata(
            id,
            vec![
                ("status", json!(ItemStatus::Failed.as_str())),
                ("error_code", json!(code)),
                ("error", json!(message)),
            ],
        )
        .await
    }

    async fn patch_metadata(&self, id: i64, patch: Vec<(&'static str, Value)>) -> Result<()> {
        self.conn
            .call(move |conn| {
                apply_metadata_patch(conn, id, &patch)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Edit history

    pub async fn append_edit(&self, edit: NewSummaryEdit) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO summary_edits (content_item_id, edit_type, previous_content, new_content, created_at)
                       VALUES (?1, ?2, ?3, ?4, ?5)"#,
                    params![
                        edit.content_item_id,
                        edit.edit_type.as_str(),
                        edit.previous_content,
                        edit.new_content,
                        now,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn list_edits(&self, content_item_id: i64) -> Result<Vec<SummaryEdit>> {
        let edits = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT id, content_item_id, edit_type, previous_content, new_content, created_at
                       FROM summary_edits WHERE content_item_id = ?1 ORDER BY id"#,
                )?;
                let edits = stmt
                    .query_map(params![content_item_id], edit_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(edits)
            })
            .await?;
        Ok(edits)
    }

    // Provider credentials

    /// Active credentials in failover order.
    pub async fn active_api_keys(&self) -> Result<Vec<ApiKey>> {
        self.query_api_keys("WHERE is_active = 1").await
    }

    pub async fn all_api_keys(&self) -> Result<Vec<ApiKey>> {
        self.query_api_keys("").await
    }

    async fn query_api_keys(&self, filter: &'static str) -> Result<Vec<ApiKey>> {
        let keys = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT id, provider, key_encrypted, priority_order, is_active, created_at
                       FROM api_keys {} ORDER BY priority_order ASC, id ASC"#,
                    filter
                ))?;
                let keys = stmt
                    .query_map([], api_key_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await?;
        Ok(keys)
    }

    pub async fn insert_api_key(&self, key: NewApiKey) -> Result<i64> {
        let encoded = key.encoded_key();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO api_keys (provider, key_encrypted, priority_order, is_active) VALUES (?1, ?2, ?3, ?4)",
                    params![key.provider.as_str(), encoded, key.priority_order, key.is_active],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn delete_api_key(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM api_keys WHERE id = ?1", params![id])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn count_api_keys(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM api_keys", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Insert `keys` only if no credential is stored yet. Returns how many
    /// were inserted.
    pub async fn seed_api_keys(&self, keys: Vec<NewApiKey>) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: i64 =
                    tx.query_row("SELECT COUNT(*) FROM api_keys", [], |row| row.get(0))?;
                if existing > 0 {
                    return Ok(0);
                }
                for key in &keys {
                    tx.execute(
                        "INSERT INTO api_keys (provider, key_encrypted, priority_order, is_active) VALUES (?1, ?2, ?3, ?4)",
                        params![key.provider.as_str(), key.encoded_key(), key.priority_order, key.is_active],
                    )?;
                }
                tx.commit()?;
                Ok(keys.len())
            })
            .await?;
        Ok(inserted)
    }

    // System prompts

    pub async fn current_system_prompt(&self) -> Result<Option<SystemPrompt>> {
        let prompt = self
            .conn
            .call(|conn| {
                let prompt = conn
                    .query_row(
                        r#"SELECT id, prompt_text, is_current, created_at FROM system_prompts
                           WHERE is_current = 1 ORDER BY id DESC LIMIT 1"#,
                        [],
                        prompt_from_row,
                    )
                    .optional()?;
                Ok(prompt)
            })
            .await?;
        Ok(prompt)
    }

    /// Store a new current prompt; previous prompts are kept but no longer
    /// current.
    pub async fn set_system_prompt(&self, prompt_text: String) -> Result<SystemPrompt> {
        let prompt = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("UPDATE system_prompts SET is_current = 0 WHERE is_current = 1", [])?;
                tx.execute(
                    "INSERT INTO system_prompts (prompt_text, is_current) VALUES (?1, 1)",
                    params![prompt_text],
                )?;
                let id = tx.last_insert_rowid();
                let prompt = tx.query_row(
                    "SELECT id, prompt_text, is_current, created_at FROM system_prompts WHERE id = ?1",
                    params![id],
                    prompt_from_row,
                )?;
                tx.commit()?;
                Ok(prompt)
            })
            .await?;
        Ok(prompt)
    }
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Merge `patch` into the item's metadata object. Null values remove keys.
fn apply_metadata_patch(
    conn: &rusqlite::Connection,
    id: i64,
    patch: &[(&str, Value)],
) -> rusqlite::Result<bool> {
    let current: Option<String> = conn
        .query_row(
            "SELECT metadata FROM content_items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Ok(false);
    };

    let mut metadata = match serde_json::from_str::<Value>(&current) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in patch {
        if value.is_null() {
            metadata.remove(*key);
        } else {
            metadata.insert((*key).to_string(), value.clone());
        }
    }

    conn.execute(
        "UPDATE content_items SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
        params![Value::Object(metadata).to_string(), Utc::now().to_rfc3339(), id],
    )?;
    Ok(true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_datetime(&raw).unwrap_or_else(Utc::now))
}

fn item_from_row(row: &Row) -> rusqlite::Result<ContentItem> {
    let content_type: String = row.get(2)?;
    let content_type = content_type
        .parse::<ContentType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
    let tags: String = row.get(6)?;
    let metadata: String = row.get(7)?;

    Ok(ContentItem {
        id: row.get(0)?,
        original_url: row.get(1)?,
        content_type,
        title: row.get(3)?,
        summary: row.get(4)?,
        original_content: row.get(5)?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata).unwrap_or_else(|_| json!({})),
        created_at: timestamp(row, 8)?,
        updated_at: timestamp(row, 9)?,
    })
}

fn edit_from_row(row: &Row) -> rusqlite::Result<SummaryEdit> {
    let edit_type: String = row.get(2)?;
    let edit_type = EditKind::parse(&edit_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown edit type: {}", edit_type).into(),
        )
    })?;

    Ok(SummaryEdit {
        id: row.get(0)?,
        content_item_id: row.get(1)?,
        edit_type,
        previous_content: row.get(3)?,
        new_content: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

fn api_key_from_row(row: &Row) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        provider: row.get(1)?,
        key_encrypted: row.get(2)?,
        priority_order: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: timestamp(row, 5)?,
    })
}

fn prompt_from_row(row: &Row) -> rusqlite::Result<SystemPrompt> {
    Ok(SystemPrompt {
        id: row.get(0)?,
        prompt_text: row.get(1)?,
        is_current: row.get::<_, i64>(2)? != 0,
        created_at: timestamp(row, 3)?,
    })
}
