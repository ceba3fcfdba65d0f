use serde::Deserialize;
use tracing::info;

use super::fetch_text;
use crate::error::{Result, SyncError};
use crate::model::{AirportRecord, AirportSet};

const REQUIRED_COLUMNS: [&str; 7] = [
    "iata_code",
    "name",
    "iso_region",
    "iso_country",
    "municipality",
    "latitude_deg",
    "longitude_deg",
];

/// Columns of the airports CSV we read; everything else is ignored. Cells
/// missing from a short row come through as `None`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AirportRow {
    iata_code: Option<String>,
    name: Option<String>,
    iso_region: Option<String>,
    iso_country: Option<String>,
    municipality: Option<String>,
    latitude_deg: Option<String>,
    longitude_deg: Option<String>,
}

/// Fetch the airports CSV and normalize it into a set keyed by IATA code.
pub async fn fetch_airports(client: &reqwest::Client, csv_url: &str) -> Result<AirportSet> {
    info!("Fetching airports CSV: {}", csv_url);
    let body = fetch_text(client, csv_url, None).await?;
    let airports = parse_airports(&body)?;
    info!("Processed {} airports", airports.len());
    Ok(airports)
}

/// Parse airports CSV text. Rows missing any of `iata_code`, `name`,
/// `iso_region`, `iso_country` or `municipality` are dropped.
pub fn parse_airports(csv_text: &str) -> Result<AirportSet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SyncError::Schema(format!("unreadable CSV header: {}", e)))?
        .clone();
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|col| !headers.iter().any(|h| h == **col))
    {
        return Err(SyncError::Schema(format!(
            "airports CSV has no '{}' column",
            missing
        )));
    }

    let mut airports = AirportSet::default();
    for (idx, row) in reader.deserialize::<AirportRow>().enumerate() {
        let line = idx + 2;
        let row = row.map_err(|e| SyncError::Schema(format!("CSV line {}: {}", line, e)))?;
        if let Some(record) = normalize_row(row, line)? {
            airports.insert(record);
        }
    }
    Ok(airports)
}

fn normalize_row(row: AirportRow, line: usize) -> Result<Option<AirportRecord>> {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    if !(present(&row.iata_code)
        && present(&row.name)
        && present(&row.iso_region)
        && present(&row.iso_country)
        && present(&row.municipality))
    {
        return Ok(None);
    }

    let iata = row.iata_code.as_deref().unwrap_or_default().trim();
    if iata.is_empty() {
        return Ok(None);
    }

    Ok(Some(AirportRecord {
        name: row.name.as_deref().unwrap_or_default().trim().to_string(),
        city: row.municipality.as_deref().unwrap_or_default().trim().to_string(),
        lat: parse_coord(row.latitude_deg.as_deref(), "latitude_deg", line)?,
        lon: parse_coord(row.longitude_deg.as_deref(), "longitude_deg", line)?,
        iata: iata.to_string(),
    }))
}

fn parse_coord(value: Option<&str>, column: &str, line: usize) -> Result<f64> {
    let raw = value.unwrap_or_default().trim();
    raw.parse::<f64>().map_err(|_| {
        SyncError::Schema(format!("CSV line {}: bad {} value {:?}", line, column, raw))
    })
}
