use anyhow::{Context, Result, bail};
use std::path::Path;
use tally_ingest::source::read_source;
use tally_ingest::{ParseError, ParsedStatement, StatementFormat};

/// Parse `path` with `format` when one is chosen, otherwise with the first
/// registry candidate for the file name that accepts it.
pub fn parse_statement(
    path: &Path,
    format: Option<StatementFormat>,
) -> Result<(StatementFormat, ParsedStatement)> {
    if let Some(format) = format {
        tracing::debug!(format = format.key(), path = %path.display(), "parsing with chosen format");
        let statement = format
            .parser()
            .parse(path)
            .with_context(|| format!("parsing {} as {}", path.display(), format.label()))?;
        return Ok((format, statement));
    }

    let candidates = order_candidates(path, StatementFormat::candidates_for(path));
    if candidates.is_empty() {
        bail!(
            "no statement format matches {}; pass --format (see `tally formats`)",
            path.display()
        );
    }

    let mut attempts: Vec<(StatementFormat, ParseError)> = Vec::new();
    for format in candidates {
        match format.parser().parse(path) {
            Ok(statement) => {
                tracing::info!(format = format.key(), lines = statement.lines.len(), "parsed statement");
                return Ok((format, statement));
            }
            // Nothing else will read a file we cannot open.
            Err(err @ ParseError::Io { .. }) => return Err(err.into()),
            Err(err) => {
                tracing::debug!(format = format.key(), error = %err, "format rejected statement");
                attempts.push((format, err));
            }
        }
    }

    bail!("{}", describe_attempts(path, &attempts))
}

/// Files opening with an XML declaration try OFX 2.x first. The SGML reader
/// also accepts them but balances them forwards.
fn order_candidates(path: &Path, mut candidates: Vec<StatementFormat>) -> Vec<StatementFormat> {
    let declares_xml = read_source(path)
        .map(|text| text.trim_start().starts_with("<?xml"))
        .unwrap_or(false);
    if declares_xml {
        candidates.sort_by_key(|format| *format != StatementFormat::OfxXml);
    }
    candidates
}

fn describe_attempts(path: &Path, attempts: &[(StatementFormat, ParseError)]) -> String {
    let mut message = format!("no statement format could read {}:", path.display());
    for (format, err) in attempts {
        message.push_str(&format!("\n  {} ({}): {}", format.label(), format.key(), err));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tally-dispatch-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    const CAPITEC: &str = "\
Capitec Bank transaction history
Nr,Account,Posting Date,Transaction Date,Description,Debit,Credit,Balance
1,1234567890,05/01/2022,04/01/2022,Card purchase Checkers,50.00,,950.00
";

    #[test]
    fn test_falls_back_to_the_dialect_that_accepts_the_file() {
        let path = scratch_file("fallback.csv", CAPITEC);
        let (format, statement) = parse_statement(&path, None).unwrap();
        assert_eq!(format, StatementFormat::CapitecCsv);
        assert_eq!(statement.lines.len(), 1);
    }

    #[test]
    fn test_chosen_format_is_not_second_guessed() {
        let path = scratch_file("chosen.csv", CAPITEC);
        let err = parse_statement(&path, Some(StatementFormat::RmbCsv)).unwrap_err();
        assert!(err.to_string().contains("RMB / FNB statement"));
    }

    #[test]
    fn test_every_attempt_is_reported() {
        let path = scratch_file("garbage.csv", "a,b,c\nd,e,f\ng,h,i\n");
        let message = parse_statement(&path, None).unwrap_err().to_string();
        for format in StatementFormat::candidates_for(&path) {
            assert!(message.contains(format.key()), "{message}");
        }
    }

    #[test]
    fn test_unknown_extension_needs_a_format() {
        let path = scratch_file("statement.qif", "!Type:Bank\n");
        let err = parse_statement(&path, None).unwrap_err();
        assert!(err.to_string().contains("--format"));
    }

    #[test]
    fn test_xml_declaration_moves_ofx_xml_first() {
        let path = scratch_file("modern.ofx", "<?xml version=\"1.0\"?>\n<?OFX OFXHEADER=\"200\"?>\n");
        assert_eq!(
            order_candidates(&path, StatementFormat::candidates_for(&path)),
            vec![StatementFormat::OfxXml, StatementFormat::OfxSgml]
        );

        let path = scratch_file("legacy.ofx", "OFXHEADER:100\n");
        assert_eq!(
            order_candidates(&path, StatementFormat::candidates_for(&path)),
            vec![StatementFormat::OfxSgml, StatementFormat::OfxXml]
        );
    }
}
