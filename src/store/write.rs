use super::{CHUNK_SIZE, Store, geometry_to_json, to_epoch};
use crate::domain::{
    Bikeway, BikeLane, Boundary, BoundaryKind, Bucket, FreeFloatingBike, Occupancy, SRID,
    StationInformation,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use tracing::{debug, info};

impl Store {
    /// Inserts station metadata in batches. A station whose id is already
    /// stored keeps its first-written row.
    pub async fn insert_stations(&self, stations: &[StationInformation]) -> Result<u64> {
        let mut inserted = 0;
        for chunk in stations.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO stations (id, name, capacity, longitude, latitude, srid) ",
            );
            qb.push_values(chunk, |mut row, s| {
                row.push_bind(s.id)
                    .push_bind(&s.name)
                    .push_bind(s.capacity)
                    .push_bind(s.position.x())
                    .push_bind(s.position.y())
                    .push_bind(SRID);
            });
            qb.push(" ON CONFLICT(id) DO NOTHING");

            let result = qb
                .build()
                .execute(&self.pool)
                .await
                .context("inserting stations")?;
            inserted += result.rows_affected();
        }

        debug!(received = stations.len(), inserted, "Stations persisted");
        Ok(inserted)
    }

    /// Appends one occupancy snapshot stamped with the current minute.
    pub async fn insert_occupancy(&self, rows: &[Occupancy]) -> Result<DateTime<Utc>> {
        self.insert_occupancy_at(rows, Utc::now()).await
    }

    /// Appends one occupancy snapshot. `fetched_at` is truncated to the
    /// minute once and that single value is written on every row.
    pub async fn insert_occupancy_at(
        &self,
        rows: &[Occupancy],
        fetched_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let bucket = Bucket::Minute.truncate(fetched_at);
        let ts = to_epoch(bucket);

        let mut tx = self.pool.begin().await.context("starting occupancy insert")?;
        for chunk in rows.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO statuses (timestamp, station_id, mechanical, electric) ",
            );
            qb.push_values(chunk, |mut row, o| {
                row.push_bind(ts)
                    .push_bind(o.station_id)
                    .push_bind(o.mechanical)
                    .push_bind(o.electric);
            });
            insert_chunk(&mut tx, qb, "statuses").await?;
        }
        tx.commit().await.context("committing occupancy insert")?;

        debug!(rows = rows.len(), timestamp = %bucket, "Occupancy snapshot appended");
        Ok(bucket)
    }

    /// Whether the boundary table of `kind` already holds any row.
    pub async fn has_boundaries(&self, kind: BoundaryKind) -> Result<bool> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {})", kind.table());
        let exists: bool = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("checking {}", kind.table()))?;
        Ok(exists)
    }

    pub async fn insert_boundaries(
        &self,
        kind: BoundaryKind,
        boundaries: &[Boundary],
    ) -> Result<u64> {
        let shapes = boundaries
            .iter()
            .map(|b| geometry_to_json(&b.shape.to_geometry()))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;
        for (chunk, chunk_shapes) in boundaries.chunks(CHUNK_SIZE).zip(shapes.chunks(CHUNK_SIZE)) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {} (name, label, shape, srid) ",
                kind.table()
            ));
            qb.push_values(chunk.iter().zip(chunk_shapes), |mut row, (b, shape)| {
                row.push_bind(&b.name)
                    .push_bind(&b.label)
                    .push_bind(shape)
                    .push_bind(SRID);
            });
            insert_chunk(&mut tx, qb, kind.table()).await?;
        }
        tx.commit().await?;

        info!(table = kind.table(), rows = boundaries.len(), "Boundaries seeded");
        Ok(boundaries.len() as u64)
    }

    /// Swaps the whole bikeway table for `bikeways` in one transaction.
    /// On any failure the previous contents stay visible.
    pub async fn replace_bikeways(&self, bikeways: &[Bikeway]) -> Result<u64> {
        let shapes = bikeways
            .iter()
            .map(|b| geometry_to_json(&geo::Geometry::LineString(b.path.clone())))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await.context("starting bikeway replace")?;
        sqlx::query("DELETE FROM bikeways")
            .execute(&mut *tx)
            .await
            .context("clearing bikeways")?;

        for (chunk, chunk_shapes) in bikeways.chunks(CHUNK_SIZE).zip(shapes.chunks(CHUNK_SIZE)) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO bikeways \
                 (typology, bidirectional, status, direction, route, shape, srid) ",
            );
            qb.push_values(chunk.iter().zip(chunk_shapes), |mut row, (b, shape)| {
                row.push_bind(&b.typology)
                    .push_bind(b.bidirectional)
                    .push_bind(&b.status)
                    .push_bind(&b.direction)
                    .push_bind(&b.route)
                    .push_bind(shape)
                    .push_bind(SRID);
            });
            insert_chunk(&mut tx, qb, "bikeways").await?;
        }

        tx.commit().await.context("committing bikeway replace")?;
        info!(rows = bikeways.len(), "Bikeways replaced");
        Ok(bikeways.len() as u64)
    }

    pub async fn replace_bike_lanes(&self, lanes: &[BikeLane]) -> Result<u64> {
        let shapes = lanes
            .iter()
            .map(|l| geometry_to_json(&l.shape))
            .collect::<Result<Vec<_>>>()?;

        let mut tx = self.pool.begin().await.context("starting bike lane replace")?;
        sqlx::query("DELETE FROM bikelanes")
            .execute(&mut *tx)
            .await
            .context("clearing bikelanes")?;

        for (chunk, chunk_shapes) in lanes.chunks(CHUNK_SIZE).zip(shapes.chunks(CHUNK_SIZE)) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO bikelanes (osm_id, name, layout, layout_side, direction, surface, \
                 borough, forest, coronapiste, temporary_layout, bidirectional, one_way_street, \
                 position, speed_limit, shape, srid) ",
            );
            qb.push_values(chunk.iter().zip(chunk_shapes), |mut row, (l, shape)| {
                row.push_bind(l.osm_id)
                    .push_bind(&l.name)
                    .push_bind(&l.layout)
                    .push_bind(&l.layout_side)
                    .push_bind(&l.direction)
                    .push_bind(&l.surface)
                    .push_bind(&l.borough)
                    .push_bind(l.forest)
                    .push_bind(l.coronapiste)
                    .push_bind(l.temporary)
                    .push_bind(l.bidirectional)
                    .push_bind(l.one_way_street)
                    .push_bind(&l.position)
                    .push_bind(&l.speed_limit)
                    .push_bind(shape)
                    .push_bind(SRID);
            });
            insert_chunk(&mut tx, qb, "bikelanes").await?;
        }

        tx.commit().await.context("committing bike lane replace")?;
        info!(rows = lanes.len(), "Bike lanes replaced");
        Ok(lanes.len() as u64)
    }

    pub async fn insert_free_floating_bikes(
        &self,
        bikes: &[FreeFloatingBike],
    ) -> Result<DateTime<Utc>> {
        self.insert_free_floating_bikes_at(bikes, Utc::now()).await
    }

    /// Appends one free-floating snapshot under a single ten-minute bucket.
    pub async fn insert_free_floating_bikes_at(
        &self,
        bikes: &[FreeFloatingBike],
        fetched_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let bucket = Bucket::TenMinutes.truncate(fetched_at);
        let ts = to_epoch(bucket);

        let mut tx = self.pool.begin().await.context("starting free-floating insert")?;
        for chunk in bikes.chunks(CHUNK_SIZE) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO free_floating_bikes (timestamp, bike_id, longitude, latitude, \
                 is_reserved, is_disabled, range_meters, vehicle_type_id, vehicle_type, \
                 last_reported, srid) ",
            );
            qb.push_values(chunk, |mut row, b| {
                row.push_bind(ts)
                    .push_bind(&b.bike_id)
                    .push_bind(b.position.x())
                    .push_bind(b.position.y())
                    .push_bind(b.is_reserved)
                    .push_bind(b.is_disabled)
                    .push_bind(b.range_meters)
                    .push_bind(&b.vehicle_type_id)
                    .push_bind(&b.vehicle_type)
                    .push_bind(b.last_reported.map(to_epoch))
                    .push_bind(SRID);
            });
            insert_chunk(&mut tx, qb, "free_floating_bikes").await?;
        }
        tx.commit().await.context("committing free-floating insert")?;

        debug!(rows = bikes.len(), timestamp = %bucket, "Free-floating snapshot appended");
        Ok(bucket)
    }
}

async fn insert_chunk(
    tx: &mut Transaction<'_, Sqlite>,
    mut qb: QueryBuilder<'_, Sqlite>,
    table: &str,
) -> Result<()> {
    qb.build()
        .execute(&mut **tx)
        .await
        .with_context(|| format!("inserting into {table}"))?;
    Ok(())
}
