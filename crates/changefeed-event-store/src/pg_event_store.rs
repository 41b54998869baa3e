//! `PostgreSQL` implementation of the `EventStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use changefeed_core::error::DomainError;
use changefeed_core::query::{EventQuery, Filter, SortOrder};
use changefeed_core::record::{EventId, EventName, EventRecord, NewEventRecord};
use changefeed_core::store::{EventStore, WriteContext};

const COLUMNS: &str = "id, name, payload, created_at, updated_at";

/// PostgreSQL-backed event record store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if a migration fails.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Infrastructure(format!("migration failed: {e}")))
    }
}

fn infrastructure(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(e.to_string())
}

fn record_from_row(row: &PgRow) -> Result<EventRecord, DomainError> {
    let id: i64 = row.try_get("id").map_err(infrastructure)?;
    let name: String = row.try_get("name").map_err(infrastructure)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(infrastructure)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(infrastructure)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(infrastructure)?;

    Ok(EventRecord {
        id: EventId(id),
        name: EventName::parse(&name)?,
        payload,
        created_at,
        updated_at,
    })
}

/// Appends `filter` to `builder` as a SQL boolean expression.
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::IdEquals(id) => {
            builder.push("id = ").push_bind(id.0);
        }
        Filter::IdGreaterThan(id) => {
            builder.push("id > ").push_bind(id.0);
        }
        Filter::CreatedAtOrAfter(t) => {
            builder.push("created_at >= ").push_bind(*t);
        }
        Filter::CreatedBefore(t) => {
            builder.push("created_at < ").push_bind(*t);
        }
        Filter::NameIn(names) => {
            let names: Vec<String> = names.iter().map(|n| n.as_str().to_owned()).collect();
            builder.push("name = ANY(").push_bind(names).push(")");
        }
        Filter::And(filters) if filters.is_empty() => {
            builder.push("TRUE");
        }
        Filter::And(filters) => {
            builder.push("(");
            for (i, inner) in filters.iter().enumerate() {
                if i > 0 {
                    builder.push(" AND ");
                }
                push_filter(builder, inner);
            }
            builder.push(")");
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn create(
        &self,
        record: NewEventRecord,
        context: WriteContext,
    ) -> Result<EventRecord, DomainError> {
        debug!(name = %record.name, skip_events = context.skip_events, "inserting event record");

        let row = sqlx::query(&format!(
            "INSERT INTO payload_events (name, payload) VALUES ($1, $2) RETURNING {COLUMNS}"
        ))
        .bind(record.name.as_str())
        .bind(&record.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)?;

        record_from_row(&row)
    }

    async fn find(&self, query: &EventQuery) -> Result<Vec<EventRecord>, DomainError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM payload_events WHERE "));
        push_filter(&mut builder, &query.filter);
        builder.push(match query.sort {
            SortOrder::Ascending => " ORDER BY created_at ASC, id ASC",
            SortOrder::Descending => " ORDER BY created_at DESC, id DESC",
        });
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn delete(&self, filter: &Filter) -> Result<u64, DomainError> {
        let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM payload_events WHERE ");
        push_filter(&mut builder, filter);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;

        Ok(result.rows_affected())
    }

    async fn now(&self) -> Result<DateTime<Utc>, DomainError> {
        sqlx::query_scalar::<_, DateTime<Utc>>("SELECT clock_timestamp()")
            .fetch_one(&self.pool)
            .await
            .map_err(infrastructure)
    }
}
