//! SQLite bookkeeping across runs: which identifiers are done, what was
//! assembled for them, and which ones failed last time.

use crate::aggregator::RunReport;
use crate::{utils, CrawlerError, ExtractionError, Prospect};
use sqlx::{sqlite::SqliteConnectOptions, Row, SqlitePool};
use std::fmt::Display;
use std::path::Path;

#[async_trait::async_trait]
pub trait Table {
    type Record<'a>;

    fn get_name(&self) -> &str;
    fn get_pool(&self) -> &SqlitePool;

    async fn create(&self) -> Result<(), sqlx::Error>;
    async fn insert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error>;

    async fn is_exist<I: AsRef<str> + Display + Send + Sync>(
        &self,
        id: I,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("SELECT id FROM {} WHERE id = ?", self.get_name());
        Ok(sqlx::query(&query)
            .bind(id.as_ref())
            .fetch_optional(self.get_pool())
            .await?
            .is_some())
    }

    async fn delete<I: AsRef<str> + Send + Sync>(&self, id: I) -> Result<(), sqlx::Error> {
        let query = format!(r#"DELETE FROM {} WHERE id = ?"#, self.get_name());
        sqlx::query(&query)
            .bind(id.as_ref())
            .execute(self.get_pool())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u32, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM {}", self.get_name());
        Ok(sqlx::query(&query)
            .fetch_one(self.get_pool())
            .await?
            .try_get(0)?)
    }
}

pub struct IdentifierTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for IdentifierTable {
    type Record<'a> = &'a str;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                "CREATE TABLE {} (
                    id TEXT PRIMARY KEY,
                    created_at DATETIME
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(&self, record: Self::Record<'a>) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT OR IGNORE INTO {} (id, created_at) VALUES (?, ?)",
            &self.name
        );
        sqlx::query(&query)
            .bind(record)
            .bind(utils::get_now())
            .execute(self.get_pool())
            .await?;
        Ok(())
    }
}

/// Assembled prospects, the full record stored as JSON.
pub struct ProspectTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for ProspectTable {
    /// The prospect and its serialized form.
    type Record<'a> = (&'a Prospect, &'a str);

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id TEXT PRIMARY KEY,
                            created_at DATETIME,
                            name TEXT,
                            position TEXT,
                            url TEXT,
                            warnings INTEGER,
                            record TEXT
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(&self, (prospect, json): Self::Record<'a>) -> Result<(), sqlx::Error> {
        let query = format!(
            r#"INSERT OR REPLACE INTO {} (
                id,
                name,
                position,
                url,
                warnings,
                record,
                created_at) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        sqlx::query(&query)
            .bind(prospect.identifier.trim())
            .bind(&prospect.name)
            .bind(&prospect.position)
            .bind(&prospect.url)
            .bind(prospect.extraction_warnings.len() as u32)
            .bind(json)
            .bind(utils::get_now())
            .execute(self.get_pool())
            .await?;
        Ok(())
    }
}

pub struct FailureTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for FailureTable {
    type Record<'a> = (&'a ExtractionError, &'a str);

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), sqlx::Error> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id TEXT PRIMARY KEY,
                            created_at DATETIME,
                            url TEXT,
                            cause TEXT,
                            record TEXT
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
        }
        Ok(())
    }

    async fn insert<'a>(&self, (error, json): Self::Record<'a>) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT OR REPLACE INTO {} (id, url, cause, record, created_at) VALUES (?, ?, ?, ?, ?)",
            self.name
        );
        sqlx::query(&query)
            .bind(error.identifier.trim())
            .bind(&error.url)
            .bind(error.kind.to_string())
            .bind(json)
            .bind(utils::get_now())
            .execute(self.get_pool())
            .await?;
        Ok(())
    }
}

pub struct ProspectStore {
    pub name: String,
    pub completed: IdentifierTable,
    pub results: ProspectTable,
    pub failed: FailureTable,
    pool: SqlitePool,
}

impl ProspectStore {
    /// Opens (or creates) the database at `path`. Table names derive from the file stem.
    pub async fn open(path: &Path) -> Result<ProspectStore, CrawlerError> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match utils::slugify(&stem).replace('-', "_") {
            s if s.is_empty() => "prospects".to_string(),
            s if s.starts_with(|c: char| c.is_ascii_digit()) => format!("p_{}", s),
            s => s,
        };

        let opt = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        let store = ProspectStore {
            completed: IdentifierTable {
                name: format!("{}_completed", name),
                pool: pool.clone(),
            },
            results: ProspectTable {
                name: format!("{}_results", name),
                pool: pool.clone(),
            },
            failed: FailureTable {
                name: format!("{}_failed", name),
                pool: pool.clone(),
            },
            name,
            pool,
        };

        store.completed.create().await?;
        store.results.create().await?;
        store.failed.create().await?;
        tracing::debug!("Using tables {}_*", store.name);

        Ok(store)
    }

    /// Identifiers assembled by earlier runs, oldest first.
    pub async fn completed(&self) -> Result<Vec<String>, CrawlerError> {
        let mut ids: Vec<String> = vec![];
        let query = format!(
            "SELECT id FROM {} ORDER BY created_at",
            self.completed.get_name()
        );
        for row in sqlx::query(&query).fetch_all(&self.pool).await? {
            ids.push(row.try_get("id")?);
        }
        Ok(ids)
    }

    /// Persists a run. A success also clears any failure recorded earlier
    /// for the same identifier.
    pub async fn record(&self, report: &RunReport) -> Result<(), CrawlerError> {
        for prospect in &report.prospects {
            let json = serde_json::to_string(prospect)?;
            self.results.insert((prospect, json.as_str())).await?;
            self.completed.insert(prospect.identifier.trim()).await?;
            self.failed.delete(prospect.identifier.trim()).await?;
        }
        for error in &report.errors {
            let json = serde_json::to_string(error)?;
            self.failed.insert((error, json.as_str())).await?;
        }
        Ok(())
    }

    pub async fn prospects(&self) -> Result<Vec<Prospect>, CrawlerError> {
        let query = format!(
            "SELECT record FROM {} ORDER BY created_at",
            self.results.get_name()
        );
        let mut prospects = vec![];
        for row in sqlx::query(&query).fetch_all(&self.pool).await? {
            let record: String = row.try_get("record")?;
            prospects.push(serde_json::from_str(&record)?);
        }
        Ok(prospects)
    }

    pub async fn failures(&self) -> Result<Vec<ExtractionError>, CrawlerError> {
        let query = format!(
            "SELECT record FROM {} ORDER BY created_at",
            self.failed.get_name()
        );
        let mut failures = vec![];
        for row in sqlx::query(&query).fetch_all(&self.pool).await? {
            let record: String = row.try_get("record")?;
            failures.push(serde_json::from_str(&record)?);
        }
        Ok(failures)
    }
}
