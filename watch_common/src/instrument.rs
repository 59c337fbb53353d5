//! Tradable instruments, the loaded catalog, and instrument file parsing.

use std::collections::HashMap;
use std::io::BufRead;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::WatchError;

/// A tradable security or contract as published by the instrument catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique display name (e.g., `NIFTY25MAYFUT`).
    pub name: String,
    /// Numeric token used by the pricing feed.
    #[serde(deserialize_with = "token_from_value")]
    pub token: u64,
    /// Opaque catalog identifier used by administrative actions.
    #[serde(rename = "id", deserialize_with = "id_from_value", default)]
    pub catalog_id: String,
}

impl Instrument {
    /// Creates a new instrument.
    pub fn new(name: &str, token: u64, catalog_id: &str) -> Self {
        Instrument {
            name: String::from(name),
            token,
            catalog_id: String::from(catalog_id),
        }
    }
}

fn token_from_value<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid token: {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid token {:?}: {}", s, e))),
        other => Err(serde::de::Error::custom(format!("invalid token: {}", other))),
    }
}

fn id_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

/// The loaded instrument universe plus the `name -> catalog id` lookup.
///
/// Instruments keep the order in which the catalog listed them. A duplicated
/// name keeps its first occurrence.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    instruments: Vec<Instrument>,
    ids_by_name: HashMap<String, String>,
}

impl Catalog {
    /// Builds a catalog, dropping repeated names.
    pub fn new(instruments: Vec<Instrument>) -> Self {
        let mut ids_by_name = HashMap::with_capacity(instruments.len());
        let mut unique = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            if ids_by_name.contains_key(&instrument.name) {
                continue;
            }
            ids_by_name.insert(instrument.name.clone(), instrument.catalog_id.clone());
            unique.push(instrument);
        }
        Catalog {
            instruments: unique,
            ids_by_name,
        }
    }

    /// All instruments in catalog order.
    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Catalog id for the instrument with the given display name.
    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.ids_by_name.get(name).map(String::as_str)
    }

    /// Number of instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Returns `true` when the catalog holds no instruments.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Trait providing file parsing for instruments.
pub trait InstrumentParser {
    /// Parses instruments from a buffered reader.
    ///
    /// Each non-empty line that does not start with `#` holds `NAME,TOKEN[,ID]`.
    /// When the id column is missing the token doubles as the catalog id.
    /// Returns an error if any line cannot be parsed.
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Instrument>, WatchError>;
}

impl InstrumentParser for Instrument {
    fn parse_from_file<R: BufRead>(reader: R) -> Result<Vec<Self>, WatchError> {
        let mut instruments = Vec::new();

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(WatchError::Io)?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = trimmed_line.split(',').map(str::trim).collect();
            let (name, token, id) = match columns.as_slice() {
                [name, token] => (*name, *token, *token),
                [name, token, id] => (*name, *token, *id),
                _ => {
                    return Err(WatchError::ParseInstrumentsFile(format!(
                        "line {}: expected NAME,TOKEN[,ID], got {:?}",
                        index + 1,
                        trimmed_line
                    )));
                }
            };
            if name.is_empty() {
                return Err(WatchError::ParseInstrumentsFile(format!(
                    "line {}: empty instrument name",
                    index + 1
                )));
            }
            let token = token.parse::<u64>().map_err(|e| {
                WatchError::ParseInstrumentsFile(format!("line {}: bad token {:?}: {}", index + 1, token, e))
            })?;
            instruments.push(Instrument::new(name, token, id));
        }
        Ok(instruments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_lines_with_and_without_ids() {
        let input = "# universe\nNIFTY25MAYFUT, 256265, 11\n\nBANKNIFTY,260105\n";
        let parsed = Instrument::parse_from_file(Cursor::new(input)).unwrap();
        assert_eq!(
            parsed,
            vec![
                Instrument::new("NIFTY25MAYFUT", 256265, "11"),
                Instrument::new("BANKNIFTY", 260105, "260105"),
            ]
        );
    }

    #[test]
    fn rejects_bad_token() {
        let err = Instrument::parse_from_file(Cursor::new("RELIANCE,abc\n")).unwrap_err();
        assert!(matches!(err, WatchError::ParseInstrumentsFile(msg) if msg.contains("line 1")));
    }

    #[test]
    fn decodes_numeric_and_string_ids() {
        let json = r#"[{"name":"A","token":1,"id":7},{"name":"B","token":"2","id":"x-2"}]"#;
        let parsed: Vec<Instrument> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed[0], Instrument::new("A", 1, "7"));
        assert_eq!(parsed[1], Instrument::new("B", 2, "x-2"));
    }

    #[test]
    fn catalog_keeps_first_duplicate_and_builds_lookup() {
        let catalog = Catalog::new(vec![
            Instrument::new("A", 1, "a1"),
            Instrument::new("B", 2, "b2"),
            Instrument::new("A", 3, "a3"),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.id_for("A"), Some("a1"));
        assert_eq!(catalog.id_for("B"), Some("b2"));
        assert_eq!(catalog.id_for("C"), None);
    }
}
