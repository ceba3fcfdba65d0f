pub mod airlines;
pub mod airports;

use reqwest::header::USER_AGENT;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::model::{to_pretty_json, Category};
use crate::settings::Settings;

/// Fetch, normalize and serialize one category.
pub async fn render(client: &reqwest::Client, category: Category, settings: &Settings) -> Result<String> {
    match category {
        Category::Airports => {
            let airports = airports::fetch_airports(client, &settings.airports_csv_url).await?;
            to_pretty_json(&airports)
        }
        Category::Airlines => {
            let airlines = airlines::fetch_airlines(client, &settings.airlines_wiki_url).await?;
            to_pretty_json(&airlines)
        }
    }
}

/// Single GET; any transport error or non-success status is a fetch error.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    user_agent: Option<&str>,
) -> Result<String> {
    let mut request = client.get(url);
    if let Some(ua) = user_agent {
        request = request.header(USER_AGENT, ua);
    }

    let response = request.send().await.map_err(|e| SyncError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    check_source_status(url, response.status().as_u16())?;

    let body = response.text().await.map_err(|e| SyncError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    debug!("Fetched {} bytes from {}", body.len(), url);
    Ok(body)
}

/// Only 2xx counts as a successful source fetch.
fn check_source_status(url: &str, status: u16) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(SyncError::Fetch {
        url: url.to_string(),
        reason: format!("HTTP {}", status),
    })
}
