use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use sqlx::{postgres::PgPoolOptions, types::Json, Executor, Pool, Postgres, Row};

use super::{BidCondition, Store};
use crate::{
    entities::{
        Bid, Facility, OriginatingRequest, RequestKind, RequestStatus, UserProfile, Vehicle,
        VehicleStatus,
    },
    error::Error,
};

type Database = Postgres;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip(db_uri))]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: Pool<Database>) -> Result<Self, Error> {
        // TODO: move the schema into sqlx migrations
        pool.execute("CREATE TABLE IF NOT EXISTS users (id TEXT PRIMARY KEY, role VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS vehicles (id TEXT PRIMARY KEY, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS facilities (id TEXT PRIMARY KEY, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS dispatch_requests (id TEXT PRIMARY KEY, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS replenishment_requests (id TEXT PRIMARY KEY, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS bids (id TEXT PRIMARY KEY, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, expires_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bids_status_expires_at ON bids (status, expires_at)")
            .await?;

        Ok(Self { pool })
    }

    async fn fetch_document<T: DeserializeOwned>(
        &self,
        sql: &str,
        id: &str,
    ) -> Result<Option<T>, Error> {
        let maybe_row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match maybe_row {
            Some(row) => {
                let Json(data): Json<serde_json::Value> = row.try_get("data")?;
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }
}

fn decode_bids(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Bid>, Error> {
    rows.into_iter()
        .map(|row| -> Result<Bid, Error> {
            let Json(data): Json<serde_json::Value> = row.try_get("data")?;
            Ok(serde_json::from_value(data)?)
        })
        .collect()
}

/// jsonb containment pattern matching any bid that invites `driver_id`.
fn invitation_pattern(driver_id: &str) -> Json<serde_json::Value> {
    Json(json!([{ "driver_id": driver_id }]))
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self))]
    async fn find_user(&self, id: &str) -> Result<Option<UserProfile>, Error> {
        self.fetch_document("SELECT data FROM users WHERE id = $1", id)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_vehicle(&self, id: &str) -> Result<Option<Vehicle>, Error> {
        self.fetch_document("SELECT data FROM vehicles WHERE id = $1", id)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_facility(&self, id: &str) -> Result<Option<Facility>, Error> {
        self.fetch_document("SELECT data FROM facilities WHERE id = $1", id)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_request(
        &self,
        kind: RequestKind,
        id: &str,
    ) -> Result<Option<OriginatingRequest>, Error> {
        let sql = format!("SELECT data FROM {} WHERE id = $1", kind.table());
        self.fetch_document(&sql, id).await
    }

    #[tracing::instrument(skip(self, bid), fields(bid_id = %bid.id))]
    async fn insert_bid(&self, bid: &Bid) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO bids (id, status, created_at, expires_at, data) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&bid.id)
        .bind(bid.status.name())
        .bind(bid.created_at)
        .bind(bid.expires_at)
        .bind(Json(bid))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_bid(&self, id: &str) -> Result<Option<Bid>, Error> {
        self.fetch_document("SELECT data FROM bids WHERE id = $1", id)
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn find_open_bid(&self, id: &str, driver_id: &str) -> Result<Option<Bid>, Error> {
        let maybe_row = sqlx::query(
            "SELECT data FROM bids WHERE id = $1 AND status = 'bidding' AND data->'assignments' @> $2",
        )
        .bind(id)
        .bind(invitation_pattern(driver_id))
        .fetch_optional(&self.pool)
        .await?;

        match maybe_row {
            Some(row) => Ok(decode_bids(vec![row])?.pop()),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_open_bids(&self, driver_id: &str) -> Result<Vec<Bid>, Error> {
        let rows = sqlx::query(
            "SELECT data FROM bids WHERE status = 'bidding' AND data->'assignments' @> $1 ORDER BY created_at ASC",
        )
        .bind(invitation_pattern(driver_id))
        .fetch_all(&self.pool)
        .await?;

        decode_bids(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn list_lapsed_bids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Bid>, Error> {
        let rows = sqlx::query(
            "SELECT data FROM bids WHERE status = 'bidding' AND expires_at <= $1 ORDER BY expires_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        decode_bids(rows)
    }

    #[tracing::instrument(skip(self, bid), fields(bid_id = %bid.id, status = %bid.status.name()))]
    async fn update_bid(&self, bid: &Bid, condition: &BidCondition) -> Result<u64, Error> {
        // predicate and write travel in one statement, so the row lock taken by
        // UPDATE serializes concurrent writers on the same bid
        let sql = match condition {
            BidCondition::OpenAt(_) => {
                "UPDATE bids SET status = $2, data = $3 WHERE id = $1 AND status = 'bidding' AND expires_at > $4"
            }
            BidCondition::LapsedAt(_) => {
                "UPDATE bids SET status = $2, data = $3 WHERE id = $1 AND status = 'bidding' AND expires_at <= $4"
            }
            BidCondition::ConfirmedBy(_) => {
                "UPDATE bids SET status = $2, data = $3 WHERE id = $1 AND status = 'confirmed' AND data->'status'->'assignment'->>'driver_id' = $4"
            }
        };

        let query = sqlx::query(sql)
            .bind(&bid.id)
            .bind(bid.status.name())
            .bind(Json(bid));

        let query = match condition {
            BidCondition::OpenAt(at) | BidCondition::LapsedAt(at) => query.bind(*at),
            BidCondition::ConfirmedBy(driver_id) => query.bind(driver_id.as_str()),
        };

        let result = query.execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn update_vehicle_status(&self, id: &str, status: VehicleStatus) -> Result<u64, Error> {
        let result = sqlx::query(
            "UPDATE vehicles SET status = $2, data = jsonb_set(data, '{status}', to_jsonb($2::text)) WHERE id = $1",
        )
        .bind(id)
        .bind(status.name())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_requests(&self, kind: RequestKind, ids: &[String]) -> Result<u64, Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE {} SET status = $2, data = jsonb_set(data, '{{status}}', to_jsonb($2::text)) WHERE id = ANY($1) AND status = $3",
            kind.table()
        );

        let result = sqlx::query(&sql)
            .bind(ids.to_vec())
            .bind(kind.resolved_status().name())
            .bind(RequestStatus::Pending.name())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    async fn put_user(&self, user: &UserProfile) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO users (id, role, data) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role, data = EXCLUDED.data",
        )
        .bind(&user.id)
        .bind(&user.role)
        .bind(Json(user))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, vehicle), fields(vehicle_id = %vehicle.id))]
    async fn put_vehicle(&self, vehicle: &Vehicle) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO vehicles (id, status, data) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, data = EXCLUDED.data",
        )
        .bind(&vehicle.id)
        .bind(vehicle.status.name())
        .bind(Json(vehicle))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, facility), fields(facility_id = %facility.id))]
    async fn put_facility(&self, facility: &Facility) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO facilities (id, data) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(&facility.id)
        .bind(Json(facility))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.id))]
    async fn put_request(&self, request: &OriginatingRequest) -> Result<(), Error> {
        let sql = format!(
            "INSERT INTO {} (id, status, data) VALUES ($1, $2, $3) ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, data = EXCLUDED.data",
            request.kind.table()
        );

        sqlx::query(&sql)
            .bind(&request.id)
            .bind(request.status.name())
            .bind(Json(request))
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[tokio::test]
#[ignore = "requires a running postgres reachable through DATABASE_URL"]
async fn pg_conditional_confirm_has_single_winner() {
    use crate::entities::sample_draft;
    use chrono::Duration;

    let url = std::env::var("DATABASE_URL").unwrap();
    let store = PgStore::new(&url, 5).await.unwrap();

    let now = Utc::now();
    let bid = Bid::new(sample_draft(), now, Duration::seconds(60));
    store.insert_bid(&bid).await.unwrap();

    let found = store.find_open_bid(&bid.id, "driver-2").await.unwrap();
    assert!(found.is_some());
    assert!(store.find_open_bid(&bid.id, "stranger").await.unwrap().is_none());

    let mut first = bid.clone();
    first.confirm("driver-1", now).unwrap();
    let mut second = bid.clone();
    second.confirm("driver-2", now).unwrap();

    let condition = BidCondition::OpenAt(now);
    assert_eq!(store.update_bid(&first, &condition).await.unwrap(), 1);
    assert_eq!(store.update_bid(&second, &condition).await.unwrap(), 0);

    let stored = store.find_bid(&bid.id).await.unwrap().unwrap();
    assert_eq!(stored.confirmed_assignment().unwrap().driver_id, "driver-1");
}
