//! Reverse-geocoding batch job for the activity feed.
//!
//! Offline tooling, not part of the rendering core. For every feed row that
//! lacks a city or state, the job reads the first trackpoint from the row's
//! GPX file, asks the Nominatim `reverse` endpoint which place that is, and
//! writes the names back into the `City` and `State` columns. Requests are
//! spaced roughly six seconds apart per the public Nominatim usage policy,
//! and the CSV is rewritten after every successful lookup so an interrupted
//! run loses nothing. Failed rows are logged and skipped; there is no retry.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{ActivityMapError, Result};
use crate::store::track_key;

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_SPACING: Duration = Duration::from_secs(6);
const DEFAULT_JITTER_MS: u64 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the batch job.
#[derive(Debug, Clone)]
pub struct GeocodeConfig {
    /// Nominatim-compatible base URL (no trailing `/reverse`)
    pub endpoint: String,
    /// Minimum delay between consecutive requests
    pub spacing: Duration,
    /// Extra random delay, 0..jitter_ms milliseconds
    pub jitter_ms: u64,
    /// Nominatim requires an identifying User-Agent
    pub user_agent: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            spacing: DEFAULT_SPACING,
            jitter_ms: DEFAULT_JITTER_MS,
            user_agent: format!("activity-map/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodeReport {
    /// Rows that were missing a city or state
    pub attempted: usize,
    /// Rows resolved and written back to the CSV
    pub resolved: usize,
    /// Rows skipped after a failed lookup
    pub failed: usize,
}

/// `reverse?format=jsonv2` response, reduced to the fields used here.
#[derive(Debug, Deserialize)]
struct NominatimResponse {
    /// Place name at the queried zoom (city / town / village)
    name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    state: Option<String>,
}

/// Reverse-geocoding batch runner.
pub struct GeocodeJob {
    client: Client,
    config: GeocodeConfig,
}

impl GeocodeJob {
    pub fn new(config: GeocodeConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ActivityMapError::Io {
                context: "http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Fill in missing `City`/`State` cells of the feed at `csv_path`,
    /// looking up track files under `gpx_dir`.
    ///
    /// Rows without a `GPX File` value are dropped from the feed, matching
    /// what the record store would skip anyway.
    pub async fn run(&self, csv_path: &Path, gpx_dir: &Path) -> Result<GeocodeReport> {
        let mut feed = FeedTable::read(csv_path)?;
        let pending = feed.rows_missing_location();
        info!(
            "Geocoding feed '{}': {} rows, {} missing a location",
            csv_path.display(),
            feed.len(),
            pending.len()
        );

        let mut report = GeocodeReport::default();
        for row in pending {
            report.attempted += 1;
            let activity_id = feed.cell(row, feed.id_col).to_string();
            let gpx_path = gpx_dir.join(format!("{}.gpx", track_key(feed.cell(row, feed.date_col))));

            // Spacing before every request keeps the rate polite even when
            // lookups fail fast
            tokio::time::sleep(self.config.spacing + self.jitter()).await;

            match self.lookup(&activity_id, &gpx_path).await {
                Ok((city, state)) => {
                    debug!("Resolved '{}' to {}, {}", activity_id, city, state);
                    feed.set_location(row, &city, &state);
                    feed.write(csv_path)?;
                    report.resolved += 1;
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Geocode run finished: {} attempted, {} resolved, {} failed",
            report.attempted, report.resolved, report.failed
        );
        Ok(report)
    }

    /// One reverse lookup: first trackpoint of the GPX file to a
    /// `(city, state)` pair. Zoom 10 asks for city-level granularity.
    async fn lookup(&self, activity_id: &str, gpx_path: &Path) -> Result<(String, String)> {
        let fail = |message: String| ActivityMapError::GeocodeFailure {
            activity_id: activity_id.to_string(),
            message,
        };

        let (lat, lon) = first_trackpoint(gpx_path).map_err(&fail)?;
        let lat = lat.to_string();
        let lon = lon.to_string();

        let response = self
            .client
            .get(format!("{}/reverse", self.config.endpoint))
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("zoom", "10"),
            ])
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }

        let body: NominatimResponse = response.json().await.map_err(|e| fail(e.to_string()))?;
        let city = body
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| fail("response has no place name".to_string()))?;
        let state = body.address.and_then(|a| a.state).unwrap_or_default();
        Ok((city, state))
    }

    fn jitter(&self) -> Duration {
        if self.config.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..self.config.jitter_ms))
    }
}

/// Latitude/longitude of the first trackpoint in a GPX file.
fn first_trackpoint(path: &Path) -> std::result::Result<(f64, f64), String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let gpx = gpx::read(io::BufReader::new(file)).map_err(|e| e.to_string())?;
    let waypoint = gpx
        .tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .flat_map(|s| s.points.iter())
        .next()
        .ok_or_else(|| format!("{}: no trackpoints", path.display()))?;
    let point = waypoint.point();
    Ok((point.y(), point.x()))
}

// ============================================================================
// Feed Table
// ============================================================================

/// The raw feed CSV held as strings, so unrelated columns round-trip
/// untouched.
#[derive(Debug)]
struct FeedTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    id_col: usize,
    date_col: usize,
    city_col: usize,
    state_col: usize,
}

impl FeedTable {
    fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ActivityMapError::Io {
            context: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(file).map_err(|message| ActivityMapError::Io {
            context: path.display().to_string(),
            message,
        })
    }

    fn parse<R: io::Read>(reader: R) -> std::result::Result<Self, String> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let mut headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| e.to_string())?
            .iter()
            .map(str::to_string)
            .collect();

        let column = |headers: &[String], name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| format!("missing '{}' column", name))
        };
        let id_col = column(&headers, "Activity Id")?;
        let date_col = column(&headers, "Date")?;
        let gpx_col = column(&headers, "GPX File")?;

        // The location columns are appended on first run
        let city_col = match headers.iter().position(|h| h == "City") {
            Some(i) => i,
            None => {
                headers.push("City".to_string());
                headers.len() - 1
            }
        };
        let state_col = match headers.iter().position(|h| h == "State") {
            Some(i) => i,
            None => {
                headers.push("State".to_string());
                headers.len() - 1
            }
        };

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| e.to_string())?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            // Rows with no track file never render; drop them here too
            if row[gpx_col].trim().is_empty() {
                continue;
            }
            rows.push(row);
        }

        Ok(Self {
            headers,
            rows,
            id_col,
            date_col,
            city_col,
            state_col,
        })
    }

    fn write(&self, path: &Path) -> Result<()> {
        let io_err = |message: String| ActivityMapError::Io {
            context: path.display().to_string(),
            message,
        };
        let mut writer = csv::Writer::from_path(path).map_err(|e| io_err(e.to_string()))?;
        self.write_to(&mut writer).map_err(io_err)
    }

    fn write_to<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> std::result::Result<(), String> {
        writer
            .write_record(&self.headers)
            .map_err(|e| e.to_string())?;
        for row in &self.rows {
            writer.write_record(row).map_err(|e| e.to_string())?;
        }
        writer.flush().map_err(|e| e.to_string())
    }

    /// Indices of rows with an empty city or state cell.
    fn rows_missing_location(&self) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&i| {
                self.cell(i, self.city_col).trim().is_empty()
                    || self.cell(i, self.state_col).trim().is_empty()
            })
            .collect()
    }

    fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    fn set_location(&mut self, row: usize, city: &str, state: &str) {
        self.rows[row][self.city_col] = city.to_string();
        self.rows[row][self.state_col] = state.to_string();
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}
