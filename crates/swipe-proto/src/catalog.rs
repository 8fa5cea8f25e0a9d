//! Station catalog sources.
//!
//! Every source returns the same thing: active stations only, ascending by
//! `display_order`, never empty.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::error::CatalogLoadError;
use crate::platform;
use crate::protocol::{Station, VideoClip};

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Human-readable source description for logs.
    fn describe(&self) -> String;

    async fn fetch_active_stations(&self) -> Result<Vec<Station>, CatalogLoadError>;
}

/// Filter to active stations, stable-sort by ordering key, reject empty.
pub fn finalize(stations: Vec<Station>) -> Result<Vec<Station>, CatalogLoadError> {
    let mut active: Vec<Station> = stations.into_iter().filter(|s| s.active).collect();
    active.sort_by_key(|s| s.display_order);
    if active.is_empty() {
        return Err(CatalogLoadError::Empty);
    }
    Ok(active)
}

// ── TOML ──────────────────────────────────────────────────────────────────────

/// Matches the TOML `[[station]]` table.  Kept separate from `Station` so the
/// file schema can stay flat (video fields inline).
#[derive(Debug, serde::Deserialize)]
struct TomlStationFile {
    #[serde(default)]
    station: Vec<TomlStation>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlStation {
    #[serde(default)]
    id: Option<String>,
    name: String,
    stream_url: String,
    #[serde(default)]
    artwork_url: String,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    video_start: Option<f64>,
    #[serde(default)]
    video_end: Option<f64>,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    display_order: Option<i64>,
    #[serde(default = "default_true")]
    active: bool,
}

fn default_true() -> bool {
    true
}

pub fn parse_stations_from_toml_str(content: &str) -> Result<Vec<Station>, CatalogLoadError> {
    let file: TomlStationFile = toml::from_str(content)?;
    let stations = file
        .station
        .into_iter()
        .enumerate()
        .map(|(pos, s)| Station {
            id: s.id.unwrap_or_else(|| pos.to_string()),
            name: s.name,
            artwork_url: s.artwork_url,
            video: s.video_url.filter(|u| !u.trim().is_empty()).map(|url| VideoClip {
                url,
                start_secs: s.video_start,
                end_secs: s.video_end,
            }),
            stream_url: s.stream_url,
            country: s.country,
            city: s.city,
            genre: s.genre,
            display_order: s.display_order.unwrap_or(pos as i64),
            active: s.active,
        })
        .collect();
    Ok(stations)
}

pub struct TomlCatalog {
    path: PathBuf,
}

impl TomlCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Catalog for TomlCatalog {
    fn describe(&self) -> String {
        format!("TOML {}", self.path.display())
    }

    async fn fetch_active_stations(&self) -> Result<Vec<Station>, CatalogLoadError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        finalize(parse_stations_from_toml_str(&content)?)
    }
}

// ── m3u ───────────────────────────────────────────────────────────────────────

pub fn parse_m3u_from_str(content: &str) -> Vec<Station> {
    let mut stations = Vec::new();
    let mut pending_name: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            if let Some(comma_idx) = rest.find(',') {
                pending_name = Some(rest[comma_idx + 1..].trim().to_string());
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let url = line.to_string();
        let name = pending_name.take().unwrap_or_else(|| url.clone());
        let pos = stations.len();

        stations.push(Station {
            id: pos.to_string(),
            name,
            stream_url: url,
            display_order: pos as i64,
            active: true,
            ..Station::default()
        });
    }

    stations
}

/// m3u playlist from a URL or a local path.
pub struct M3uCatalog {
    source: String,
}

impl M3uCatalog {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    fn is_remote(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }
}

#[async_trait]
impl Catalog for M3uCatalog {
    fn describe(&self) -> String {
        format!("m3u {}", self.source)
    }

    async fn fetch_active_stations(&self) -> Result<Vec<Station>, CatalogLoadError> {
        let text = if self.is_remote() {
            let response = reqwest::get(&self.source).await?;
            if !response.status().is_success() {
                return Err(CatalogLoadError::Unreachable(format!(
                    "HTTP {}",
                    response.status()
                )));
            }
            response.text().await?
        } else {
            tokio::fs::read_to_string(&self.source).await?
        };
        finalize(parse_m3u_from_str(&text))
    }
}

// ── remote JSON ───────────────────────────────────────────────────────────────

/// A hosted stations table exposed as a JSON array of rows.
pub struct RemoteCatalog {
    url: String,
    client: reqwest::Client,
}

impl RemoteCatalog {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

/// One row of the hosted table.  Accepts the table's own column names
/// (`logo_url`, `is_active`, flat `video_*` columns) as well as the nested
/// `Station` shape.
#[derive(Debug, serde::Deserialize)]
struct StationRow {
    id: serde_json::Value,
    name: String,
    #[serde(default)]
    stream_url: Option<String>,
    #[serde(default, alias = "logo_url")]
    artwork_url: Option<String>,
    #[serde(default)]
    video: Option<VideoClip>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    video_start_time: Option<f64>,
    #[serde(default)]
    video_end_time: Option<f64>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    display_order: Option<i64>,
    #[serde(default, alias = "is_active")]
    active: Option<bool>,
}

impl StationRow {
    fn into_station(self, pos: usize) -> Station {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let flat = self
            .video_url
            .filter(|u| !u.trim().is_empty())
            .map(|url| VideoClip {
                url,
                start_secs: self.video_start_time,
                end_secs: self.video_end_time,
            });
        Station {
            id,
            name: self.name,
            artwork_url: self.artwork_url.unwrap_or_default(),
            video: self.video.filter(|v| !v.url.trim().is_empty()).or(flat),
            stream_url: self.stream_url.unwrap_or_default(),
            country: self.country.unwrap_or_default(),
            city: self.city,
            genre: self.genre,
            display_order: self.display_order.unwrap_or(pos as i64),
            active: self.active.unwrap_or(true),
        }
    }
}

pub fn parse_stations_from_json_str(content: &str) -> Result<Vec<Station>, CatalogLoadError> {
    let rows: Vec<StationRow> = serde_json::from_str(content)?;
    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(pos, row)| row.into_station(pos))
        .collect())
}

#[async_trait]
impl Catalog for RemoteCatalog {
    fn describe(&self) -> String {
        format!("remote {}", self.url)
    }

    async fn fetch_active_stations(&self) -> Result<Vec<Station>, CatalogLoadError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CatalogLoadError::Unreachable(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let text = response.text().await?;
        finalize(parse_stations_from_json_str(&text)?)
    }
}

// ── source chain ──────────────────────────────────────────────────────────────

/// Sources in priority order for this configuration.
pub fn sources(config: &CatalogConfig) -> Vec<Box<dyn Catalog>> {
    let mut out: Vec<Box<dyn Catalog>> = Vec::new();

    if config.stations_toml.exists() {
        out.push(Box::new(TomlCatalog::new(&config.stations_toml)));
    }
    if let Some(beside) = platform::beside_exe("stations.toml") {
        out.push(Box::new(TomlCatalog::new(beside)));
    }
    let local = Path::new("stations.toml");
    if local.exists() {
        out.push(Box::new(TomlCatalog::new(local)));
    }
    if let Some(url) = config.remote_url.as_deref().filter(|u| !u.is_empty()) {
        out.push(Box::new(RemoteCatalog::new(url)));
    }
    if let Some(m3u) = config.m3u.as_deref().filter(|u| !u.is_empty()) {
        out.push(Box::new(M3uCatalog::new(m3u)));
    }
    out
}

/// Try each source in turn; the first non-empty active list wins.
pub async fn load_catalog(config: &CatalogConfig) -> Result<Vec<Station>, CatalogLoadError> {
    load_from(sources(config)).await
}

pub async fn load_from(sources: Vec<Box<dyn Catalog>>) -> Result<Vec<Station>, CatalogLoadError> {
    let mut last_err = CatalogLoadError::Empty;
    for source in sources {
        match source.fetch_active_stations().await {
            Ok(stations) => {
                info!(
                    "Loaded {} stations from {}",
                    stations.len(),
                    source.describe()
                );
                return Ok(stations);
            }
            Err(e) => {
                warn!("Station source {} failed: {}", source.describe(), e);
                last_err = e;
            }
        }
    }
    Err(last_err)
}
