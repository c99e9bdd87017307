//! Short URL domain - DB queries for the `ShortUrls` table
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&SqlitePool` (for standalone queries) and `&mut SqliteConnection`
//! (inside a [`TransactionRunner`](crate::services::tx::TransactionRunner) unit of work).

use base64::Engine;
use chrono::NaiveDateTime;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};
use sqlx::{Executor, Sqlite};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

type HmacSha512 = Hmac<Sha512>;

const SELECT_SHORT_URL: &str = r#"
    SELECT Alias AS alias, Origin AS origin, Hits AS hits,
           CreatedAt AS created_at, UpdatedAt AS updated_at
    FROM ShortUrls
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ShortUrl {
    pub alias: String,
    pub origin: String,
    pub hits: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Alias/origin pair without bookkeeping columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ThinShortUrl {
    pub alias: String,
    pub origin: String,
}

impl From<ShortUrl> for ThinShortUrl {
    fn from(s: ShortUrl) -> Self {
        Self {
            alias: s.alias,
            origin: s.origin,
        }
    }
}

/// 1-based page of results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn is_valid(&self) -> bool {
        self.page >= 1 && (1..=MAX_PAGE_SIZE).contains(&self.size)
    }

    fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.size)
    }
}

/// Derive a deterministic alias for `origin`.
///
/// HMAC-SHA512 keyed with `key` over the SHA-256 digest of the origin, base64
/// encoded, stripped to ASCII alphanumerics and cut to `length` characters.
pub fn generate_alias(origin: &str, key: &[u8], length: usize) -> String {
    let digest = Sha256::digest(origin.as_bytes());

    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(&digest);
    let encoded = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    encoded
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(length)
        .collect()
}

/// Get a short URL by alias
pub async fn get_by_alias<'e, E>(executor: E, alias: &str) -> Result<Option<ShortUrl>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{SELECT_SHORT_URL} WHERE Alias = ?");
    sqlx::query_as(&sql)
        .bind(alias)
        .fetch_optional(executor)
        .await
}

/// Insert a new short URL. Returns `None` if the alias is already taken.
pub async fn insert<'e, E>(
    executor: E,
    alias: &str,
    origin: &str,
) -> Result<Option<ThinShortUrl>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        INSERT INTO ShortUrls (Alias, Origin)
        VALUES (?, ?)
        ON CONFLICT (Alias) DO NOTHING
        RETURNING Alias AS alias, Origin AS origin
        "#,
    )
    .bind(alias)
    .bind(origin)
    .fetch_optional(executor)
    .await
}

/// Delete a short URL. Returns whether a row was removed.
pub async fn delete_by_alias<'e, E>(executor: E, alias: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM ShortUrls WHERE Alias = ?")
        .bind(alias)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Bump the hit counter in place
pub async fn increment_hits<'e, E>(executor: E, alias: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE ShortUrls
        SET Hits = Hits + 1, UpdatedAt = CURRENT_TIMESTAMP
        WHERE Alias = ?
        "#,
    )
    .bind(alias)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Short URLs whose origin contains `query` (case-insensitive) or whose alias contains it
pub async fn search<'e, E>(
    executor: E,
    query: &str,
    page: Page,
) -> Result<Vec<ShortUrl>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"{SELECT_SHORT_URL}
        WHERE lower(Origin) LIKE ? ESCAPE '\' OR Alias LIKE ? ESCAPE '\'
        ORDER BY CreatedAt DESC, Alias
        LIMIT ? OFFSET ?"#
    );
    sqlx::query_as(&sql)
        .bind(contains_pattern(&query.to_lowercase()))
        .bind(contains_pattern(query))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(executor)
        .await
}

/// All short URLs, newest first
pub async fn list<'e, E>(executor: E, page: Page) -> Result<Vec<ShortUrl>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"{SELECT_SHORT_URL}
        ORDER BY CreatedAt DESC, Alias
        LIMIT ? OFFSET ?"#
    );
    sqlx::query_as(&sql)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(executor)
        .await
}

// LIKE pattern matching `needle` anywhere, with wildcards in the needle escaped
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
