//! Durable spatial/time-series store backed by SQLite.
//!
//! Geometries are kept as GeoJSON text next to an `srid` column; timestamps
//! are UTC epoch seconds. The write side lives in [`write`], the read side
//! in [`read`].

mod read;
mod write;

pub use read::{
    BikeLaneRow, BikewayRow, BoundaryRow, DistributionPoint, FreeFloatingRow, StationSnapshot,
    TimeSeriesPoint,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

const SCHEMA: &str = include_str!("schema.sql");

/// Rows per multi-row INSERT statement; keeps every statement well under
/// SQLite's bound-parameter limit.
const CHUNK_SIZE: usize = 500;

/// Handle to the database. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url '{url}'"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to '{url}'"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "Store ready");
        Ok(store)
    }

    /// A private in-memory database, used by tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        // every connection to :memory: is a distinct database, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("opening in-memory database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .context("applying schema")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_epoch(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Stored timestamps are whole seconds, so a sub-second instant matches none.
fn exact_epoch(at: DateTime<Utc>) -> Option<i64> {
    (at.timestamp_subsec_nanos() == 0).then(|| at.timestamp())
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).with_context(|| format!("timestamp {secs} out of range"))
}

/// Serializes a geometry to GeoJSON text, coordinates in (lon, lat) order.
fn geometry_to_json(geometry: &geo::Geometry<f64>) -> Result<String> {
    let value = geojson::Value::from(geometry);
    serde_json::to_string(&geojson::Geometry::new(value)).context("serializing geometry")
}

/// Parses GeoJSON text stored by [`geometry_to_json`].
pub fn geometry_from_json(text: &str) -> Result<geo::Geometry<f64>> {
    let geometry: geojson::Geometry =
        serde_json::from_str(text).context("parsing stored geometry")?;
    geo::Geometry::<f64>::try_from(geometry).context("converting stored geometry")
}
