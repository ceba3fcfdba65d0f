use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Result, SyncError};

/// One airport row from the CSV feed. Field order matches the published JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirportRecord {
    pub name: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub iata: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AirlineRecord {
    pub name: String,
    pub iata: String,
}

/// Airports keyed by IATA code. Keeps first-seen key order; a duplicate code
/// replaces the earlier value in place.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct AirportSet(IndexMap<String, AirportRecord>);

impl AirportSet {
    pub fn insert(&mut self, record: AirportRecord) {
        self.0.insert(record.iata.clone(), record);
    }

    #[cfg(test)]
    pub fn get(&self, iata: &str) -> Option<&AirportRecord> {
        self.0.get(iata)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn codes(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// The two published data categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Category {
    Airports,
    Airlines,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Airports, Category::Airlines];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Airports => "Airports",
            Category::Airlines => "Airlines",
        }
    }

    /// Repository-relative path of the published JSON file.
    pub fn repo_path(&self) -> &'static str {
        match self {
            Category::Airports => "docs/airports_data.json",
            Category::Airlines => "docs/airlines_data.json",
        }
    }

    /// Discriminator of the config entry in the document database.
    pub fn config_type(&self) -> &'static str {
        match self {
            Category::Airports => "airportsData",
            Category::Airlines => "airlinesData",
        }
    }
}

/// Pretty JSON with two-space indentation. serde_json leaves non-ASCII as is.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SyncError::Schema(format!("cannot serialize records: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airport(iata: &str, name: &str) -> AirportRecord {
        AirportRecord {
            name: name.into(),
            city: "Somewhere".into(),
            lat: 1.5,
            lon: -2.0,
            iata: iata.into(),
        }
    }

    #[test]
    fn duplicate_code_last_write_wins_keeps_position() {
        let mut set = AirportSet::default();
        assert!(set.is_empty());
        set.insert(airport("AAA", "First"));
        set.insert(airport("BBB", "Second"));
        set.insert(airport("AAA", "Replaced"));
        assert_eq!(set.len(), 2);
        assert_eq!(set.codes(), vec!["AAA", "BBB"]);
        assert_eq!(set.get("AAA").map(|a| a.name.as_str()), Some("Replaced"));
    }

    #[test]
    fn airport_json_shape() {
        let mut set = AirportSet::default();
        set.insert(airport("JFK", "John F Kennedy Intl"));
        let json = to_pretty_json(&set).unwrap();
        let expected = "{\n  \"JFK\": {\n    \"name\": \"John F Kennedy Intl\",\n    \"city\": \"Somewhere\",\n    \"lat\": 1.5,\n    \"lon\": -2.0,\n    \"iata\": \"JFK\"\n  }\n}";
        assert_eq!(json, expected);
    }

    #[test]
    fn non_ascii_kept_verbatim() {
        let rec = AirlineRecord {
            name: "Aerolíneas Argentinas".into(),
            iata: "AR".into(),
        };
        let json = to_pretty_json(&vec![rec]).unwrap();
        assert!(json.contains("Aerolíneas"));
    }

    #[test]
    fn category_paths_are_distinct() {
        assert_ne!(Category::Airports.repo_path(), Category::Airlines.repo_path());
        assert_eq!(Category::Airports.config_type(), "airportsData");
        assert_eq!(Category::Airlines.config_type(), "airlinesData");
    }
}
