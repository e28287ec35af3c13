//! OFX 2.x (XML) statement parser
//!
//! The document is a processing-instruction header followed by one `OFX`
//! element:
//!   <?xml version="1.0" encoding="UTF-8"?>
//!   <?OFX OFXHEADER="200" VERSION="211" SECURITY="NONE" OLDFILEUID="NONE" NEWFILEUID="NONE"?>
//!   <OFX>
//!     <BANKMSGSRSV1><STMTTRNRS><STMTRS>
//!       <BANKACCTFROM><ACCTID>62000000001</ACCTID></BANKACCTFROM>
//!       <BANKTRANLIST>
//!         <STMTTRN>
//!           <TRNTYPE>DEBIT</TRNTYPE><DTPOSTED>20220105</DTPOSTED>
//!           <DTUSER>20220104093000</DTUSER><TRNAMT>-50.00</TRNAMT>
//!           <FITID>1</FITID><MEMO>Groceries</MEMO>
//!         </STMTTRN>
//!       </BANKTRANLIST>
//!       <LEDGERBAL><BALAMT>1000.00</BALAMT></LEDGERBAL>
//!     </STMTRS></STMTTRNRS></BANKMSGSRSV1>
//!   </OFX>
//!
//! Lines come out latest first, with balances worked backwards from the
//! ledger balance.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use rust_decimal::Decimal;

use crate::dates::{OFX_DATE, OFX_DATE_TIME, parse_date_prefix};
use crate::error::{Location, ParseError};
use crate::numeral::{clean_numeral, parse_numeral};
use crate::parsers::{StatementParser, unescape_text};
use crate::source::read_source;
use crate::types::{Line, ParsedStatement};

const HEADER_TARGET: &str = "OFX";
const HEADER_ATTRIBUTES: [&str; 5] = ["OFXHEADER", "VERSION", "SECURITY", "OLDFILEUID", "NEWFILEUID"];
const TRANSACTION_FIELDS: [&str; 6] = ["TRNTYPE", "DTPOSTED", "DTUSER", "TRNAMT", "FITID", "MEMO"];

#[derive(Debug, Clone, Copy, Default)]
pub struct OfxXmlParser;

impl StatementParser for OfxXmlParser {
    fn parse(&self, source: &Path) -> Result<ParsedStatement, ParseError> {
        parse_ofx_xml_text(source, &read_source(source)?)
    }
}

/// Minimal owned element tree; attributes are not used by OFX.
#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    line: usize,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn new(name: String, line: usize) -> Self {
        Self {
            name,
            line,
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// Depth-first search below this element.
    fn find(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find_map(|child| if child.name == name { Some(child) } else { child.find(name) })
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'e>(&'e self, name: &'e str) -> impl Iterator<Item = &'e Element> {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn text(&self) -> &str {
        self.text.trim()
    }
}

struct Document {
    header: HashMap<String, String>,
    header_line: usize,
    root: Element,
}

/// Maps reader offsets to 1-based lines. Offsets only move forward, so each
/// byte is scanned once.
struct LineCursor<'t> {
    text: &'t str,
    offset: usize,
    line: usize,
}

impl<'t> LineCursor<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            offset: 0,
            line: 1,
        }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        let end = offset.min(self.text.len());
        if end > self.offset {
            self.line += self.text.as_bytes()[self.offset..end]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.offset = end;
        }
        self.line
    }
}

fn parse_header(content: &str) -> Result<HashMap<String, String>, regex::Error> {
    let pair = Regex::new(r#"([A-Za-z][A-Za-z0-9]*)\s*=\s*"([^"]*)""#)?;
    Ok(pair
        .captures_iter(content)
        .map(|caps| (caps[1].to_ascii_uppercase(), caps[2].to_string()))
        .collect())
}

/// Read the document into an element tree, enforcing the top-level shape.
fn read_document(path: &Path, text: &str) -> Result<Document, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut header: Option<(HashMap<String, String>, usize)> = None;
    let mut root: Option<Element> = None;
    let mut stack: Vec<Element> = Vec::new();
    let mut lines = LineCursor::new(text);

    loop {
        let event = reader.read_event().map_err(|e| {
            ParseError::structure(
                Location::line(path, lines.line_at(reader.buffer_position() as usize)),
                format!("malformed XML: {e}"),
            )
        })?;
        // Tags never span lines in practice, so the end of the event is on
        // the line it starts on.
        let line = lines.line_at(reader.buffer_position() as usize);
        let unexpected = |what: &str| {
            ParseError::structure(Location::line(path, line), format!("unexpected content: {what}"))
        };

        match event {
            Event::Decl(_) if stack.is_empty() && header.is_none() && root.is_none() => {}
            Event::PI(pi) => {
                if !stack.is_empty() {
                    continue;
                }
                let target = String::from_utf8_lossy(pi.target()).to_string();
                if header.is_some() || root.is_some() || target != HEADER_TARGET {
                    return Err(unexpected(&format!("processing instruction '{target}'")));
                }
                let content = String::from_utf8_lossy(pi.content()).to_string();
                let attributes = parse_header(&content)
                    .map_err(|e| ParseError::internal(Location::file(path), e))?;
                header = Some((attributes, line));
            }
            Event::Start(start) => {
                if stack.is_empty() && root.is_some() {
                    return Err(unexpected("second root element"));
                }
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                stack.push(Element::new(name, line));
            }
            Event::Empty(empty) => {
                let name = String::from_utf8_lossy(empty.name().as_ref()).to_string();
                let element = Element::new(name, line);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None if root.is_none() => root = Some(element),
                    None => return Err(unexpected("second root element")),
                }
            }
            Event::End(_) => {
                let Some(element) = stack.pop() else {
                    return Err(unexpected("closing tag outside of the document element"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(content) => {
                let raw = String::from_utf8_lossy(&content);
                match stack.last_mut() {
                    Some(element) => element.text.push_str(&unescape_text(&raw)),
                    None if raw.trim().is_empty() => {}
                    None => return Err(unexpected("text outside of the document element")),
                }
            }
            Event::CData(data) => match stack.last_mut() {
                Some(element) => element.text.push_str(&String::from_utf8_lossy(&data)),
                None => return Err(unexpected("CDATA outside of the document element")),
            },
            Event::Comment(_) | Event::Decl(_) if !stack.is_empty() => {}
            Event::Comment(_) => return Err(unexpected("comment")),
            Event::DocType(_) => return Err(unexpected("document type declaration")),
            Event::Decl(_) => return Err(unexpected("misplaced XML declaration")),
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::structure(
            Location::line(path, lines.line_at(text.len())),
            format!("document ends inside <{}>", open.name),
        ));
    }
    let (header, header_line) =
        header.ok_or_else(|| ParseError::missing(Location::file(path), "<?OFX ...?> header"))?;
    let root = root.ok_or_else(|| ParseError::missing(Location::file(path), "<OFX> element"))?;
    if root.name != "OFX" {
        return Err(ParseError::structure(
            Location::line(path, root.line),
            format!("unexpected content: root element <{}>", root.name),
        ));
    }

    Ok(Document {
        header,
        header_line,
        root,
    })
}

fn validate_header(path: &Path, document: &Document) -> Result<(), ParseError> {
    let location = || Location::line(path, document.header_line);
    for attribute in HEADER_ATTRIBUTES {
        if !document.header.contains_key(attribute) {
            return Err(ParseError::missing(
                location(),
                format!("{attribute} in OFX header"),
            ));
        }
    }

    let ofxheader = &document.header["OFXHEADER"];
    if ofxheader != "200" {
        return Err(ParseError::structure(
            location(),
            format!("invalid OFX header: OFXHEADER is '{ofxheader}', expected 200"),
        ));
    }

    let version = &document.header["VERSION"];
    match version.trim().parse::<u32>() {
        Ok(v) if v >= 200 => Ok(()),
        _ => Err(ParseError::structure(
            location(),
            format!("invalid OFX header: VERSION '{version}' is not 200 or later"),
        )),
    }
}

fn descend<'e>(path: &Path, parent: &'e Element, name: &str) -> Result<&'e Element, ParseError> {
    parent
        .find(name)
        .ok_or_else(|| ParseError::missing(Location::line(path, parent.line), format!("<{name}>")))
}

fn amount(element: &Element, location: Location) -> Result<Decimal, ParseError> {
    parse_numeral(&clean_numeral(element.text()))
        .map_err(|e| ParseError::malformed(location, &element.name, element.text(), e))
}

struct OfxTransaction {
    posted_on: NaiveDateTime,
    user_date: NaiveDateTime,
    amount: Decimal,
    memo: String,
}

fn read_transaction(
    path: &Path,
    stmttrn: &Element,
    ordinal: usize,
) -> Result<OfxTransaction, ParseError> {
    let at = |line: usize| Location::line(path, line).with_transaction(ordinal);

    let mut fields = HashMap::new();
    for name in TRANSACTION_FIELDS {
        let field = stmttrn
            .child(name)
            .ok_or_else(|| ParseError::missing(at(stmttrn.line), format!("<{name}> in <STMTTRN>")))?;
        fields.insert(name, field);
    }

    let date = |name: &str, format| {
        let field = fields[name];
        parse_date_prefix(field.text(), format)
            .map_err(|reason| ParseError::malformed(at(field.line), name, field.text(), reason))
    };
    let posted_on = date("DTPOSTED", OFX_DATE)?;
    let user_date = date("DTUSER", OFX_DATE_TIME)?;

    let trnamt = fields["TRNAMT"];
    Ok(OfxTransaction {
        posted_on,
        user_date,
        amount: amount(trnamt, at(trnamt.line))?,
        memo: fields["MEMO"].text().to_string(),
    })
}

/// Parse an OFX 2.x export. `path` is only used to localize errors.
pub fn parse_ofx_xml_text(path: &Path, text: &str) -> Result<ParsedStatement, ParseError> {
    let document = read_document(path, text)?;
    validate_header(path, &document)?;

    let msgs = descend(path, &document.root, "BANKMSGSRSV1")?;
    let trnrs = descend(path, msgs, "STMTTRNRS")?;
    let stmtrs = descend(path, trnrs, "STMTRS")?;

    let account = stmtrs
        .child("BANKACCTFROM")
        .ok_or_else(|| ParseError::missing(Location::line(path, stmtrs.line), "<BANKACCTFROM>"))?;
    let acctid = account.child("ACCTID").ok_or_else(|| {
        ParseError::missing(Location::line(path, account.line), "<ACCTID> in <BANKACCTFROM>")
    })?;
    if acctid.text().is_empty() {
        return Err(ParseError::missing(
            Location::line(path, acctid.line),
            "account number in <ACCTID>",
        ));
    }

    let stmttrns: Vec<&Element> = stmtrs
        .child("BANKTRANLIST")
        .map(|list| list.children_named("STMTTRN").collect())
        .unwrap_or_default();
    if stmttrns.is_empty() {
        return Err(ParseError::structure(
            Location::line(path, stmtrs.line),
            "no transactions found",
        ));
    }
    let mut transactions = Vec::with_capacity(stmttrns.len());
    for (index, stmttrn) in stmttrns.into_iter().enumerate() {
        transactions.push(read_transaction(path, stmttrn, index + 1)?);
    }

    let ledger = stmtrs
        .child("LEDGERBAL")
        .ok_or_else(|| ParseError::missing(Location::line(path, stmtrs.line), "<LEDGERBAL>"))?;
    let balamt = ledger.child("BALAMT").ok_or_else(|| {
        ParseError::missing(Location::line(path, ledger.line), "<BALAMT> in <LEDGERBAL>")
    })?;
    let ledger_balance = amount(balamt, Location::line(path, balamt.line))?;

    // Latest first; the ledger balance belongs to the latest transaction.
    transactions.sort_by(|a, b| b.user_date.cmp(&a.user_date));

    let mut running = ledger_balance;
    let mut later_amount: Option<Decimal> = None;
    let mut lines = Vec::with_capacity(transactions.len());
    for trn in transactions {
        if let Some(later) = later_amount {
            running -= later;
        }
        later_amount = Some(trn.amount);
        lines.push(Line::new(
            trn.posted_on,
            Some(trn.user_date),
            trn.amount,
            running,
            trn.memo,
        ));
    }

    Ok(ParsedStatement::new(lines).with_account_number(acctid.text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<?OFX OFXHEADER="200" VERSION="211" SECURITY="NONE" OLDFILEUID="NONE" NEWFILEUID="NONE"?>
"#;

    fn document(header: &str, transactions: &str, ledger: &str) -> String {
        format!(
            "{header}<OFX>
<SIGNONMSGSRSV1><SONRS><STATUS><CODE>0</CODE><SEVERITY>INFO</SEVERITY></STATUS></SONRS></SIGNONMSGSRSV1>
<BANKMSGSRSV1>
<STMTTRNRS>
<TRNUID>1</TRNUID>
<STMTRS>
<CURDEF>ZAR</CURDEF>
<BANKACCTFROM><BANKID>250655</BANKID><ACCTID>62000000001</ACCTID><ACCTTYPE>CHECKING</ACCTTYPE></BANKACCTFROM>
<BANKTRANLIST>
<DTSTART>20220101</DTSTART><DTEND>20220131</DTEND>
{transactions}</BANKTRANLIST>
{ledger}</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>
"
        )
    }

    const LEDGER: &str = "<LEDGERBAL><BALAMT>1000.00</BALAMT><DTASOF>20220131</DTASOF></LEDGERBAL>\n";

    fn trn(user: &str, amount: &str, memo: &str) -> String {
        format!(
            "<STMTTRN><TRNTYPE>OTHER</TRNTYPE><DTPOSTED>{posted}[+2:SAST]</DTPOSTED><DTUSER>{user}.000[+2:SAST]</DTUSER><TRNAMT>{amount}</TRNAMT><FITID>{user}</FITID><MEMO>{memo}</MEMO></STMTTRN>\n",
            posted = &user[..8]
        )
    }

    fn three_transactions() -> String {
        // Document order is oldest first.
        [
            trn("20220105080000", "-50.00", "t1"),
            trn("20220106080000", "20.00", "t2"),
            trn("20220107080000", "-5.00", "t3"),
        ]
        .concat()
    }

    #[test]
    fn test_backward_balance_latest_first() {
        let text = document(HEADER, &three_transactions(), LEDGER);
        let statement = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap();

        assert_eq!(statement.account_number.as_deref(), Some("62000000001"));
        let order: Vec<_> = statement.lines.iter().map(|l| l.description.as_str()).collect();
        let balances: Vec<_> = statement.lines.iter().map(|l| l.balance).collect();
        assert_eq!(order, vec!["t3", "t2", "t1"]);
        assert_eq!(balances, vec![dec!(1000.00), dec!(1005.00), dec!(985.00)]);

        let latest = &statement.lines[0];
        assert_eq!(latest.amount, dec!(-5.00));
        assert_eq!(
            latest.transaction_date.unwrap().to_string(),
            "2022-01-07 08:00:00"
        );
        assert_eq!(latest.posted_on.to_string(), "2022-01-07 00:00:00");
    }

    #[test]
    fn test_memo_entities_are_resolved() {
        let text = document(HEADER, &trn("20220105080000", "-1.00", "TOM &amp; JERRY"), LEDGER);
        let statement = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap();
        assert_eq!(statement.lines[0].description, "TOM & JERRY");
    }

    #[test]
    fn test_missing_header_attribute() {
        let header = HEADER.replace(r#" NEWFILEUID="NONE""#, "");
        let text = document(&header, &three_transactions(), LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralViolation);
        assert!(err.to_string().contains("NEWFILEUID"));
    }

    #[test]
    fn test_rejects_old_header_versions() {
        let header = HEADER.replace(r#"VERSION="211""#, r#"VERSION="102""#);
        let text = document(&header, &three_transactions(), LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert!(err.to_string().contains("VERSION"));

        let header = HEADER.replace(r#"OFXHEADER="200""#, r#"OFXHEADER="100""#);
        let text = document(&header, &three_transactions(), LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert!(err.to_string().contains("OFXHEADER"));
    }

    #[test]
    fn test_top_level_comment_is_unexpected() {
        let header = format!("{HEADER}<!-- exported by bank -->\n");
        let text = document(&header, &three_transactions(), LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralViolation);
        assert!(err.to_string().contains("unexpected content"));
        assert_eq!(err.location().line, Some(3));
    }

    #[test]
    fn test_missing_dtuser_reports_ordinal() {
        let broken = trn("20220106080000", "20.00", "t2")
            .replace("<DTUSER>20220106080000.000[+2:SAST]</DTUSER>", "");
        let transactions = [trn("20220105080000", "-50.00", "t1"), broken].concat();
        let text = document(HEADER, &transactions, LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralViolation);
        assert_eq!(err.location().transaction, Some(2));
        assert!(err.to_string().contains("<DTUSER>"));
    }

    #[test]
    fn test_no_transactions_found() {
        let text = document(HEADER, "", LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert!(err.to_string().contains("no transactions found"));
    }

    #[test]
    fn test_missing_ledger_balance() {
        let text = document(HEADER, &three_transactions(), "");
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralViolation);
        assert!(err.to_string().contains("<LEDGERBAL>"));
    }

    #[test]
    fn test_short_dtuser_is_malformed() {
        let transactions = trn("20220105080000", "-1.00", "x")
            .replace("20220105080000.000[+2:SAST]", "20220105");
        let text = document(HEADER, &transactions, LEDGER);
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedField);
        assert_eq!(err.location().transaction, Some(1));
    }

    #[test]
    fn test_line_cursor_only_moves_forward() {
        let mut lines = LineCursor::new("a\nb\n\nc");
        assert_eq!(lines.line_at(0), 1);
        assert_eq!(lines.line_at(2), 2);
        assert_eq!(lines.line_at(5), 4);
        // Earlier offsets never rewind the count.
        assert_eq!(lines.line_at(1), 4);
        assert_eq!(lines.line_at(100), 4);
    }

    #[test]
    fn test_large_statement_keeps_line_numbers() {
        let transactions: String = (0..5_000)
            .map(|i| {
                let day = 1 + i % 28;
                let secs = i % 86_400;
                let user = format!(
                    "202201{day:02}{:02}{:02}{:02}",
                    secs / 3600,
                    secs / 60 % 60,
                    secs % 60
                );
                trn(&user, "-1.00", &format!("t{i}"))
            })
            .collect();
        let text = document(HEADER, &transactions, LEDGER);
        let statement = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap();
        assert_eq!(statement.lines.len(), 5_000);
        assert_eq!(statement.lines[0].balance, dec!(1000.00));

        let broken = text.replace("</BANKMSGSRSV1>", "</BANKMSGSRSV2>");
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &broken).unwrap_err();
        let close_line = text.lines().position(|l| l.contains("</BANKMSGSRSV1>")).unwrap() + 1;
        assert_eq!(err.location().line, Some(close_line));
    }

    #[test]
    fn test_malformed_xml() {
        let text = format!("{HEADER}<OFX><BANKMSGSRSV1></OFX>");
        let err = parse_ofx_xml_text(Path::new("s.ofx"), &text).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralViolation);
    }
}
