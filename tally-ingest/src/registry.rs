//! The formats a caller can pick from, each with the parser that reads it.
//!
//! The registry only describes formats; selecting one and reacting to a
//! failed parse is left to the caller.

use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::parsers::{
    CapitecCsvParser, HistoryCsvParser, OfxSgmlParser, OfxXmlParser, RmbCsvParser,
    StatementParser,
};

static HISTORY_CSV: HistoryCsvParser = HistoryCsvParser;
static CAPITEC_CSV: CapitecCsvParser = CapitecCsvParser;
static RMB_CSV: RmbCsvParser = RmbCsvParser;
static OFX_SGML: OfxSgmlParser = OfxSgmlParser;
static OFX_XML: OfxXmlParser = OfxXmlParser;

/// Supported statement formats, in the order they are offered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StatementFormat {
    #[serde(rename = "history-csv")]
    HistoryCsv,
    #[serde(rename = "capitec-csv")]
    CapitecCsv,
    #[serde(rename = "rmb-csv")]
    RmbCsv,
    #[serde(rename = "ofx-sgml")]
    OfxSgml,
    #[serde(rename = "ofx-xml")]
    OfxXml,
}

impl StatementFormat {
    pub const ALL: [StatementFormat; 5] = [
        StatementFormat::HistoryCsv,
        StatementFormat::CapitecCsv,
        StatementFormat::RmbCsv,
        StatementFormat::OfxSgml,
        StatementFormat::OfxXml,
    ];

    /// Human readable name shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            StatementFormat::HistoryCsv => "Transaction history (CSV)",
            StatementFormat::CapitecCsv => "Capitec statement (CSV)",
            StatementFormat::RmbCsv => "RMB / FNB statement (CSV)",
            StatementFormat::OfxSgml => "OFX 1.x statement (SGML)",
            StatementFormat::OfxXml => "OFX 2.x statement (XML)",
        }
    }

    /// File-name pattern offered for this format.
    pub fn glob(&self) -> &'static str {
        match self {
            StatementFormat::HistoryCsv | StatementFormat::CapitecCsv | StatementFormat::RmbCsv => {
                "*.csv"
            }
            StatementFormat::OfxSgml | StatementFormat::OfxXml => "*.ofx",
        }
    }

    /// Stable identifier used on the command line and in config files.
    pub fn key(&self) -> &'static str {
        match self {
            StatementFormat::HistoryCsv => "history-csv",
            StatementFormat::CapitecCsv => "capitec-csv",
            StatementFormat::RmbCsv => "rmb-csv",
            StatementFormat::OfxSgml => "ofx-sgml",
            StatementFormat::OfxXml => "ofx-xml",
        }
    }

    pub fn from_key(key: &str) -> Option<StatementFormat> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|format| format.key().eq_ignore_ascii_case(key))
    }

    pub fn parser(&self) -> &'static dyn StatementParser {
        match self {
            StatementFormat::HistoryCsv => &HISTORY_CSV,
            StatementFormat::CapitecCsv => &CAPITEC_CSV,
            StatementFormat::RmbCsv => &RMB_CSV,
            StatementFormat::OfxSgml => &OFX_SGML,
            StatementFormat::OfxXml => &OFX_XML,
        }
    }

    /// Whether the file name of `path` matches this format's glob, ignoring
    /// case.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        Pattern::new(self.glob())
            .map(|pattern| pattern.matches_with(name, options))
            .unwrap_or(false)
    }

    /// Formats whose glob matches `path`, in registry order.
    pub fn candidates_for(path: &Path) -> Vec<StatementFormat> {
        Self::ALL
            .into_iter()
            .filter(|format| format.matches(path))
            .collect()
    }
}

impl std::fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip() {
        for format in StatementFormat::ALL {
            assert_eq!(StatementFormat::from_key(format.key()), Some(format));
        }
        assert_eq!(
            StatementFormat::from_key(" OFX-XML "),
            Some(StatementFormat::OfxXml)
        );
        assert_eq!(StatementFormat::from_key("qif"), None);
    }

    #[test]
    fn test_serde_uses_keys() {
        for format in StatementFormat::ALL {
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format.key()));
        }
    }

    #[test]
    fn test_candidates_follow_table_order() {
        assert_eq!(
            StatementFormat::candidates_for(Path::new("/tmp/Statement.CSV")),
            vec![
                StatementFormat::HistoryCsv,
                StatementFormat::CapitecCsv,
                StatementFormat::RmbCsv
            ]
        );
        assert_eq!(
            StatementFormat::candidates_for(Path::new("export.ofx")),
            vec![StatementFormat::OfxSgml, StatementFormat::OfxXml]
        );
        assert!(StatementFormat::candidates_for(Path::new("notes.txt")).is_empty());
        assert!(StatementFormat::candidates_for(Path::new("/")).is_empty());
    }

    #[test]
    fn test_labels_are_distinct() {
        let mut labels: Vec<_> = StatementFormat::ALL.iter().map(|f| f.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), StatementFormat::ALL.len());
    }

    #[test]
    fn test_parser_handles_dispatch_by_format() {
        let missing = Path::new("/nonexistent/statement.ofx");
        for format in StatementFormat::ALL {
            let err = format.parser().parse(missing).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Io);
        }
    }
}
