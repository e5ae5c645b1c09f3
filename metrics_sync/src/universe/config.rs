//! Universe file: parsing, normalization, and loading.
//!
//! The file is a list of tracked entities:
//!
//! ```toml
//! [[entities]]
//! symbol = "AAPL"
//! name = "Apple Inc."
//!
//! [[entities]]
//! symbol = "msft"
//! ```
//!
//! Normalization trims and upper-cases symbols, rejects invalid ones, trims names
//! (blank becomes absent), and drops duplicate symbols keeping the first entry.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::universe::{Entity, normalize_symbol};

/// Top-level universe file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UniverseFile {
    #[serde(default)]
    pub entities: Vec<EntityCfg>,
}

/// One `[[entities]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EntityCfg {
    pub symbol: String,
    pub name: Option<String>,
}

/// What normalization changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Symbols whose spelling changed (case or whitespace).
    pub symbols_rewritten: usize,
    /// Later duplicates that were dropped.
    pub duplicates_dropped: usize,
}

/// Normalize in place. Fails on the first invalid symbol.
pub fn normalize_universe(file: &mut UniverseFile) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(file.entities.len());

    for (idx, e) in std::mem::take(&mut file.entities).into_iter().enumerate() {
        let Some(symbol) = normalize_symbol(&e.symbol) else {
            bail!("entities[{idx}]: invalid symbol {:?}", e.symbol);
        };
        if symbol != e.symbol {
            report.symbols_rewritten += 1;
        }
        if !seen.insert(symbol.clone()) {
            report.duplicates_dropped += 1;
            continue;
        }
        let name = e
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        out.push(EntityCfg { symbol, name });
    }

    file.entities = out;
    Ok(report)
}

/// Parse and normalize a universe from TOML text.
pub fn load_universe_str(s: &str) -> anyhow::Result<UniverseFile> {
    let mut file: UniverseFile = toml::from_str(s).context("parsing universe TOML")?;
    normalize_universe(&mut file)?;
    Ok(file)
}

/// Parse and normalize a universe file.
pub fn load_universe_path(path: impl AsRef<Path>) -> anyhow::Result<UniverseFile> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading universe file {}", path.display()))?;
    load_universe_str(&s).with_context(|| format!("in {}", path.display()))
}

impl UniverseFile {
    /// Entities in file order.
    pub fn to_entities(&self) -> Vec<Entity> {
        self.entities
            .iter()
            .map(|e| Entity {
                symbol: e.symbol.clone(),
                name: e.name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_dedupes() {
        let toml = r#"
[[entities]]
symbol = " aapl "
name = "Apple Inc."

[[entities]]
symbol = "MSFT"
name = "  "

[[entities]]
symbol = "AAPL"
name = "Duplicate"
"#;
        let mut file: UniverseFile = toml::from_str(toml).unwrap();
        let report = normalize_universe(&mut file).unwrap();

        assert_eq!(
            report,
            NormalizationReport {
                symbols_rewritten: 1,
                duplicates_dropped: 1
            }
        );
        let entities = file.to_entities();
        assert_eq!(entities, vec![Entity::named("AAPL", "Apple Inc."), Entity::new("MSFT")]);
    }

    #[test]
    fn invalid_symbol_is_an_error() {
        let err = load_universe_str("[[entities]]\nsymbol = \"A B\"\n").unwrap_err();
        assert!(err.to_string().contains("entities[0]"), "{err:#}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(load_universe_str("[[entities]]\nsymbol = \"A\"\nsector = \"x\"\n").is_err());
        assert!(load_universe_str("[settings]\n").is_err());
    }

    #[test]
    fn empty_file_is_an_empty_universe() {
        assert!(load_universe_str("").unwrap().entities.is_empty());
    }
}
