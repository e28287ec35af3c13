//! Bank-specific statement parsers.
//!
//! Each dialect exposes a `parse_*_text(path, text)` function over content
//! already in memory and a unit struct implementing [`StatementParser`] that
//! reads the file first.

use std::path::Path;

use quick_xml::escape::resolve_predefined_entity;

use crate::error::ParseError;
use crate::types::ParsedStatement;

pub mod capitec_csv;
mod csv_rows;
pub mod history_csv;
pub mod ofx_sgml;
pub mod ofx_xml;
pub mod rmb_csv;

pub use capitec_csv::CapitecCsvParser;
pub use history_csv::HistoryCsvParser;
pub use ofx_sgml::OfxSgmlParser;
pub use ofx_xml::OfxXmlParser;
pub use rmb_csv::RmbCsvParser;

/// The single capability every statement format provides.
///
/// Implementations hold no state between calls, so one instance may be
/// shared across threads.
pub trait StatementParser: Send + Sync {
    fn parse(&self, source: &Path) -> Result<ParsedStatement, ParseError>;
}

/// Resolve XML entity and character references in OFX text content.
///
/// Each `&name;` is resolved on its own. Bare ampersands and unknown entities
/// are common in SGML exports and are kept as written.
pub(crate) fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let resolved = after
            .find(';')
            .and_then(|end| resolve_reference(&after[..end]).map(|text| (end, text)));
        match resolved {
            Some((end, text)) => {
                out.push_str(&text);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_reference(name: &str) -> Option<String> {
    let Some(number) = name.strip_prefix('#') else {
        return resolve_predefined_entity(name).map(str::to_string);
    };
    let code = match number.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse::<u32>().ok()?,
    };
    char::from_u32(code).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text("A &lt;B&gt; &amp; C"), "A <B> & C");
        assert_eq!(unescape_text("caf&#233;"), "café");
        assert_eq!(unescape_text("A & B"), "A & B");
    }

    #[test]
    fn test_unescape_resolves_each_reference_independently() {
        assert_eq!(unescape_text("TOM &amp; JERRY & SONS"), "TOM & JERRY & SONS");
        assert_eq!(unescape_text("CAF&eacute; &amp; BAR"), "CAF&eacute; & BAR");
        assert_eq!(unescape_text("R&D; caf&#xE9; &quot;x&quot;"), "R&D; café \"x\"");
        assert_eq!(unescape_text("bad &#xD800; &#; trailing &"), "bad &#xD800; &#; trailing &");
    }
}
