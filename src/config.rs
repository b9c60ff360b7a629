//! Process configuration read from the environment (and `.env`).

use crate::domain::DatasetKind;
use crate::fetch::FeedSource;
use crate::query::DEFAULT_RESOLUTION;
use anyhow::{Context, Result};
use chrono::TimeDelta;
use h3o::Resolution;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://velib.db?mode=rwc";

/// Longest accepted time-series window, in days.
const MAX_WINDOW_DAYS: i64 = 36_500;

const VELIB_OPENDATA: &str =
    "https://velib-metropole-opendata.smovengo.cloud/opendata/Velib_Metropole";
const PARIS_DATASETS: &str = "https://opendata.paris.fr/api/explore/v2.1/catalog/datasets";
const GEOJSON_EXPORT: &str = "exports/geojson?lang=fr&timezone=Europe%2FBerlin";
const FREE_FLOATING_BIKES_URL: &str =
    "https://data.lime.bike/api/partners/v2/gbfs/paris/free_bike_status";

/// Where each dataset is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSources {
    pub station_information: FeedSource,
    pub station_status: FeedSource,
    pub districts: FeedSource,
    pub boroughs: FeedSource,
    pub bikeways: FeedSource,
    pub bikelanes: FeedSource,
    pub free_floating_bikes: FeedSource,
}

impl FeedSources {
    pub fn get(&self, dataset: DatasetKind) -> &FeedSource {
        match dataset {
            DatasetKind::Stations => &self.station_information,
            DatasetKind::Statuses => &self.station_status,
            DatasetKind::Districts => &self.districts,
            DatasetKind::Boroughs => &self.boroughs,
            DatasetKind::Bikeways => &self.bikeways,
            DatasetKind::BikeLanes => &self.bikelanes,
            DatasetKind::FreeFloatingBikes => &self.free_floating_bikes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub h3_resolution: Resolution,
    pub time_series_window: TimeDelta,
    pub sources: FeedSources,
}

impl Config {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset keys take their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let paris = |dataset: &str| format!("{PARIS_DATASETS}/{dataset}/{GEOJSON_EXPORT}");
        let source = |key: &str, default: &str| -> Result<FeedSource> {
            let raw = var(key, default);
            raw.parse().with_context(|| format!("{key}='{raw}'"))
        };

        let resolution_raw = var("H3_RESOLUTION", &DEFAULT_RESOLUTION.to_string());
        let h3_resolution = resolution_raw
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(|r| Resolution::try_from(r).ok())
            .with_context(|| {
                format!("H3_RESOLUTION='{resolution_raw}' is not an integer in 0..=15")
            })?;

        let window_raw = var("TIME_SERIES_WINDOW_DAYS", "7");
        let time_series_window = window_raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|days| (1..=MAX_WINDOW_DAYS).contains(days))
            .and_then(TimeDelta::try_days)
            .with_context(|| {
                format!("TIME_SERIES_WINDOW_DAYS='{window_raw}' must be 1..={MAX_WINDOW_DAYS} days")
            })?;

        Ok(Self {
            database_url: var("DATABASE_URL", DEFAULT_DATABASE_URL),
            h3_resolution,
            time_series_window,
            sources: FeedSources {
                station_information: source(
                    "STATION_INFORMATION_URL",
                    &format!("{VELIB_OPENDATA}/station_information.json"),
                )?,
                station_status: source(
                    "STATION_STATUS_URL",
                    &format!("{VELIB_OPENDATA}/station_status.json"),
                )?,
                districts: source("DISTRICTS_URL", &paris("quartier_paris"))?,
                boroughs: source("BOROUGHS_URL", &paris("arrondissements"))?,
                bikeways: source("BIKEWAYS_URL", &paris("reseau-cyclable"))?,
                bikelanes: source("BIKELANES_URL", &paris("amenagements-cyclables"))?,
                free_floating_bikes: source("FREE_FLOATING_BIKES_URL", FREE_FLOATING_BIKES_URL)?,
            },
        })
    }
}
