// PostgreSQL implementation of the RecordStore trait
//
// A single tokio-postgres client is shared by every worker. The client
// pipelines concurrent queries over its connection, so inserts from
// different workers do not serialize on a lock here.

use async_trait::async_trait;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, error, info};

use super::{RecordStore, StoreResult};
use crate::config::{validate_identifier, StoreSettings};
use crate::error::{HarnessError, Result, StoreError};
use crate::record::{Payload, Record};

/// PostgreSQL-backed record store
pub struct PostgresStore {
    client: Client,
    table: String,
}

impl PostgresStore {
    /// Connect, spawn the connection task and ping the server
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        validate_identifier(&settings.table)?;

        let mut config: Config = settings.database_url.parse().map_err(|e| {
            HarnessError::StoreSetup(format!("Invalid DATABASE_URL: {}", e))
        })?;
        if let Some(user) = &settings.user {
            config.user(user.as_str());
        }
        if let Some(password) = &settings.password {
            config.password(password.as_str());
        }

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| HarnessError::StoreSetup(format!("Failed to connect: {}", e)))?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| HarnessError::StoreSetup(format!("Ping failed: {}", e)))?;

        info!(table = %settings.table, "Connected to PostgreSQL");

        Ok(Self {
            client,
            table: settings.table.clone(),
        })
    }

    /// Quoted table name, safe to interpolate after validation
    fn table(&self) -> String {
        format!("\"{}\"", self.table)
    }
}

fn record_from_row(row: &Row) -> StoreResult<Record> {
    let decode = |e: tokio_postgres::Error| StoreError::Decode(e.to_string());

    Ok(Record {
        id: row.try_get("id").map_err(decode)?,
        payload: Payload {
            email: row.try_get("email").map_err(decode)?,
            first_name: row.try_get("first_name").map_err(decode)?,
            last_name: row.try_get("last_name").map_err(decode)?,
        },
        number: row.try_get("number").map_err(decode)?,
        published_at: row.try_get("published_at").map_err(decode)?,
        consumed_at: row.try_get("consumed_at").map_err(decode)?,
    })
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn reset(&self) -> StoreResult<()> {
        debug!("PostgresStore::reset: {}", self.table);

        let table = self.table();
        self.client
            .batch_execute(&format!(
                "DROP TABLE IF EXISTS {table};
                 CREATE TABLE {table} (
                     row_id BIGSERIAL PRIMARY KEY,
                     id TEXT NOT NULL,
                     email TEXT NOT NULL,
                     first_name TEXT NOT NULL,
                     last_name TEXT NOT NULL,
                     number BIGINT NOT NULL,
                     published_at BIGINT NOT NULL,
                     consumed_at BIGINT NOT NULL
                 );",
                table = table
            ))
            .await?;
        Ok(())
    }

    async fn insert_one(&self, record: &Record) -> StoreResult<()> {
        let consumed_at = record
            .consumed_at
            .ok_or_else(|| StoreError::Unconsumed(record.id.clone()))?;

        self.client
            .execute(
                format!(
                    "INSERT INTO {} (id, email, first_name, last_name, number, published_at, consumed_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    self.table()
                )
                .as_str(),
                &[
                    &record.id,
                    &record.payload.email,
                    &record.payload.first_name,
                    &record.payload.last_name,
                    &record.number,
                    &record.published_at,
                    &consumed_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_sorted_by_consumed_at(&self, limit: usize) -> StoreResult<Vec<Record>> {
        let limit = limit as i64;
        let rows = self
            .client
            .query(
                format!(
                    "SELECT id, email, first_name, last_name, number, published_at, consumed_at
                     FROM {}
                     ORDER BY consumed_at ASC, row_id ASC
                     LIMIT $1",
                    self.table()
                )
                .as_str(),
                &[&limit],
            )
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count(&self) -> StoreResult<u64> {
        let row = self
            .client
            .query_one(format!("SELECT COUNT(*) FROM {}", self.table()).as_str(), &[])
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count as u64)
    }

    async fn count_distinct_ids(&self) -> StoreResult<u64> {
        let row = self
            .client
            .query_one(
                format!("SELECT COUNT(DISTINCT id) FROM {}", self.table()).as_str(),
                &[],
            )
            .await?;
        let count: i64 = row.try_get(0)?;
        Ok(count as u64)
    }
}
