use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::fetch_text;
use crate::error::{Result, SyncError};
use crate::model::AirlineRecord;

/// Some hosts reject the default client identifier.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

fn selector(css: &'static str, cell: &'static OnceLock<Selector>) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).unwrap())
}

fn table_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector("table.wikitable", &SEL)
}

fn tr_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector("tr", &SEL)
}

fn th_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector("th", &SEL)
}

fn td_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector("td", &SEL)
}

fn italic_sel() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    selector("i", &SEL)
}

/// Fetch the airline codes page and extract active carriers.
pub async fn fetch_airlines(client: &reqwest::Client, wiki_url: &str) -> Result<Vec<AirlineRecord>> {
    info!("Fetching airlines from {}", wiki_url);
    let html = fetch_text(client, wiki_url, Some(BROWSER_USER_AGENT)).await?;
    let airlines = parse_airlines(&html)?;
    info!("Processed {} active airlines", airlines.len());
    Ok(airlines)
}

/// Extract airlines from the first `wikitable` on the page. Carriers whose
/// name cell is italicized are treated as defunct and skipped. Duplicates are
/// kept in page order.
pub fn parse_airlines(html: &str) -> Result<Vec<AirlineRecord>> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(table_sel())
        .next()
        .ok_or_else(|| SyncError::Schema("no table with class 'wikitable'".into()))?;

    let mut rows = table.select(tr_sel());
    let header = rows
        .next()
        .ok_or_else(|| SyncError::Schema("airline table has no rows".into()))?;
    let titles: Vec<String> = header
        .select(th_sel())
        .map(|th| cell_text(th).to_lowercase())
        .collect();

    let column = |label: &str| {
        titles
            .iter()
            .position(|t| t == label)
            .ok_or_else(|| SyncError::Schema(format!("airline table has no '{}' column", label)))
    };
    let iata_idx = column("iata")?;
    let airline_idx = column("airline")?;
    let needed = iata_idx.max(airline_idx);

    let mut airlines = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let cols: Vec<ElementRef> = row.select(td_sel()).collect();
        if cols.len() <= needed {
            skipped += 1;
            continue;
        }
        match extract_row(cols[iata_idx], cols[airline_idx]) {
            Some(record) => airlines.push(record),
            None => skipped += 1,
        }
    }
    debug!("Skipped {} airline rows", skipped);
    Ok(airlines)
}

fn extract_row(iata_cell: ElementRef, airline_cell: ElementRef) -> Option<AirlineRecord> {
    // Italic name marks a defunct carrier on the source page.
    if airline_cell.select(italic_sel()).next().is_some() {
        return None;
    }

    let iata = cell_text(iata_cell);
    if !is_airline_code(&iata) {
        return None;
    }

    let name = strip_annotations(&cell_text(airline_cell));
    if name.is_empty() {
        return None;
    }
    Some(AirlineRecord { name, iata })
}

/// Exactly two alphanumeric characters.
fn is_airline_code(code: &str) -> bool {
    code.chars().count() == 2 && code.chars().all(char::is_alphanumeric)
}

/// Remove `[...]` and `(...)` annotations such as citation marks.
fn strip_annotations(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\[.*?\]|\(.*?\)").unwrap());
    collapse_whitespace(&re.replace_all(raw, ""))
}

/// Text nodes joined by single spaces, so `<a>Air</a> Canada` reads
/// "Air Canada".
fn cell_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
