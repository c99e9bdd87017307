//! Short URL service: validation plus transaction boundaries around the
//! `domain::short_urls` queries.

use sqlx::Sqlite;
use tracing::{debug, info};

use crate::constants::{ALIAS_LENGTH, MAX_PAGE_SIZE};
use crate::domain::short_urls::{self, Page, ShortUrl, ThinShortUrl};
use crate::services::tx::{TransactionError, TransactionRunner};

#[derive(Debug, thiserror::Error)]
pub enum ShortUrlError {
    #[error("invalid origin URL: {0}")]
    InvalidOrigin(String),
    #[error("alias must be exactly {len} characters", len = ALIAS_LENGTH)]
    InvalidAlias,
    #[error("page must be >= 1 and size between 1 and {max}", max = MAX_PAGE_SIZE)]
    InvalidPage,
    #[error(transparent)]
    Transaction(#[from] TransactionError<sqlx::Error>),
}

/// Outcome of [`ShortUrlService::shorten`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortened {
    Created(ThinShortUrl),
    /// The origin (or one hashing to the same alias) was already shortened
    AlreadyExists(ThinShortUrl),
}

impl Shortened {
    pub fn short_url(&self) -> &ThinShortUrl {
        match self {
            Shortened::Created(s) | Shortened::AlreadyExists(s) => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShortUrlService {
    runner: TransactionRunner<Sqlite>,
    signing_key: Vec<u8>,
}

impl ShortUrlService {
    pub fn new(runner: TransactionRunner<Sqlite>, signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            runner,
            signing_key: signing_key.into(),
        }
    }

    pub async fn shorten(&self, origin: &str) -> Result<Shortened, ShortUrlError> {
        validate_origin(origin)?;

        let alias = short_urls::generate_alias(origin, &self.signing_key, ALIAS_LENGTH);
        let origin = origin.to_string();

        let committed = self
            .runner
            .read_write(|conn| {
                Box::pin(async move {
                    let created = short_urls::insert(&mut *conn, &alias, &origin).await?;
                    Ok::<_, sqlx::Error>(match created {
                        Some(thin) => Shortened::Created(thin),
                        None => Shortened::AlreadyExists(ThinShortUrl { alias, origin }),
                    })
                })
            })
            .await?;

        if let Shortened::Created(thin) = &committed.value {
            info!(alias = %thin.alias, "short url created");
        }
        Ok(committed.into_inner())
    }

    /// Look up an alias and count the visit. `None` when the alias is unknown.
    pub async fn resolve(&self, alias: &str) -> Result<Option<ShortUrl>, ShortUrlError> {
        validate_alias(alias)?;
        let alias = alias.to_string();

        let committed = self
            .runner
            .read_write(|conn| {
                Box::pin(async move {
                    if !short_urls::increment_hits(&mut *conn, &alias).await? {
                        return Ok(None);
                    }
                    short_urls::get_by_alias(&mut *conn, &alias).await
                })
            })
            .await?;

        Ok(committed.into_inner())
    }

    pub async fn remove(&self, alias: &str) -> Result<bool, ShortUrlError> {
        validate_alias(alias)?;
        let alias = alias.to_string();

        let committed = self
            .runner
            .read_write(|conn| {
                Box::pin(async move { short_urls::delete_by_alias(&mut *conn, &alias).await })
            })
            .await?;

        if committed.value {
            info!(at = %committed.committed_at, "short url deleted");
        }
        Ok(committed.into_inner())
    }

    pub async fn search(&self, query: &str, page: Page) -> Result<Vec<ShortUrl>, ShortUrlError> {
        if !page.is_valid() {
            return Err(ShortUrlError::InvalidPage);
        }
        let query = query.to_string();

        let committed = self
            .runner
            .read_only(|conn| {
                Box::pin(async move { short_urls::search(&mut *conn, &query, page).await })
            })
            .await?;

        debug!(results = committed.value.len(), "short url search");
        Ok(committed.into_inner())
    }

    pub async fn list(&self, page: Page) -> Result<Vec<ShortUrl>, ShortUrlError> {
        if !page.is_valid() {
            return Err(ShortUrlError::InvalidPage);
        }

        let committed = self
            .runner
            .read_only(|conn| Box::pin(async move { short_urls::list(&mut *conn, page).await }))
            .await?;

        Ok(committed.into_inner())
    }
}

fn validate_origin(origin: &str) -> Result<(), ShortUrlError> {
    let parsed =
        url::Url::parse(origin).map_err(|e| ShortUrlError::InvalidOrigin(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(()),
        "http" | "https" => Err(ShortUrlError::InvalidOrigin("missing host".to_string())),
        other => Err(ShortUrlError::InvalidOrigin(format!(
            "unsupported scheme `{other}`"
        ))),
    }
}

fn validate_alias(alias: &str) -> Result<(), ShortUrlError> {
    if alias.chars().count() == ALIAS_LENGTH {
        Ok(())
    } else {
        Err(ShortUrlError::InvalidAlias)
    }
}
