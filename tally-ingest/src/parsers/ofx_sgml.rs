//! OFX 1.x (SGML) statement parser
//!
//! Legacy OFX is a tag stream without indentation rules where leaf elements
//! never close:
//!   OFXHEADER:100
//!   DATA:OFXSGML
//!
//!   <OFX>
//!   <BANKMSGSRSV1><STMTTRNRS><STMTRS>
//!   <BANKACCTFROM>
//!   <ACCTID>62000000001
//!   </BANKACCTFROM>
//!   <BANKTRANLIST>
//!   <STMTTRN>
//!   <DTPOSTED>20220105
//!   <TRNAMT>-50.00
//!   <MEMO>POS PURCHASE 28 DEC
//!   </STMTTRN>
//!   </BANKTRANLIST>
//!   <LEDGERBAL><BALAMT>1000.00</LEDGERBAL>
//!   ...
//!
//! The stream is folded into a tag tree one segment at a time. Only the
//! subtrees needed for the statement are kept.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;

use crate::dates::{OFX_DATE, TransactionDateExtractor, parse_date_prefix};
use crate::error::{Location, ParseError};
use crate::numeral::{clean_numeral, parse_numeral};
use crate::parsers::{StatementParser, unescape_text};
use crate::source::{read_source, strip_bom};
use crate::types::{Line, ParsedStatement};

const BANKACCTFROM: &str = "BANKACCTFROM";
const BANKTRANLIST: &str = "BANKTRANLIST";
const LEDGERBAL: &str = "LEDGERBAL";
const TAGS_OF_INTEREST: [&str; 3] = [BANKACCTFROM, BANKTRANLIST, LEDGERBAL];

#[derive(Debug, Clone, Copy, Default)]
pub struct OfxSgmlParser;

impl StatementParser for OfxSgmlParser {
    fn parse(&self, source: &Path) -> Result<ParsedStatement, ParseError> {
        parse_ofx_sgml_text(source, &read_source(source)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tag {
    Simple(SimpleTag),
    Complex(ComplexTag),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimpleTag {
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ComplexTag {
    pub(crate) name: String,
    pub(crate) line: usize,
    pub(crate) children: Vec<Tag>,
}

#[cfg(test)]
impl Tag {
    fn name(&self) -> &str {
        match self {
            Tag::Simple(tag) => &tag.name,
            Tag::Complex(tag) => &tag.name,
        }
    }
}

impl ComplexTag {
    fn new(name: &str, line: usize) -> Self {
        Self {
            name: name.to_string(),
            line,
            children: Vec::new(),
        }
    }

    pub(crate) fn simple(&self, name: &str) -> Option<&SimpleTag> {
        self.children.iter().find_map(|child| match child {
            Tag::Simple(tag) if tag.name == name => Some(tag),
            _ => None,
        })
    }

    pub(crate) fn complex_children(&self) -> impl Iterator<Item = &ComplexTag> {
        self.children.iter().filter_map(|child| match child {
            Tag::Complex(tag) => Some(tag),
            Tag::Simple(_) => None,
        })
    }
}

/// One tag as it appears in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    /// `<NAME>` alone: an aggregate until proven otherwise.
    Open(&'a str),
    /// `<NAME>content`
    Simple(&'a str, &'a str),
    /// `</NAME>`
    Close(&'a str),
}

/// Split one non-blank body line into segments.
fn segments(line: &str) -> Result<Vec<Segment<'_>>, String> {
    let line = line.trim();
    let Some(body) = line.strip_prefix('<') else {
        return Err(format!("text outside of a tag: '{line}'"));
    };

    let mut out: Vec<Segment<'_>> = Vec::new();
    for piece in body.split('<') {
        if piece.starts_with('!') || piece.starts_with('?') {
            continue;
        }
        let (name, content) = piece
            .split_once('>')
            .ok_or_else(|| format!("unterminated tag '<{piece}'"))?;
        let content = content.trim();

        let segment = match name.trim().strip_prefix('/') {
            Some(closed) => {
                // `<NAME>value</NAME>` closes its own leaf.
                if let Some(Segment::Simple(prev, _)) = out.last() {
                    if prev.eq_ignore_ascii_case(closed.trim()) {
                        continue;
                    }
                }
                Segment::Close(closed.trim())
            }
            None if content.is_empty() => Segment::Open(name.trim()),
            None => Segment::Simple(name.trim(), content),
        };

        let tag_name = match segment {
            Segment::Open(n) | Segment::Simple(n, _) | Segment::Close(n) => n,
        };
        if tag_name.is_empty() {
            return Err("empty tag name".to_string());
        }
        out.push(segment);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Continue,
    Complete,
}

/// Builds the tag tree with an explicit stack of open aggregates.
///
/// `stack[0]` is a synthetic root. Nodes are only attached to their parent
/// while one of [`TAGS_OF_INTEREST`] is open; everything else is dropped as
/// soon as it closes.
struct TagTreeBuilder {
    stack: Vec<ComplexTag>,
    retained_depth: usize,
    captured: HashMap<String, ComplexTag>,
}

impl TagTreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![ComplexTag::new("", 0)],
            retained_depth: 0,
            captured: HashMap::new(),
        }
    }

    fn is_of_interest(name: &str) -> bool {
        TAGS_OF_INTEREST.contains(&name)
    }

    fn attach(&mut self, tag: Tag) {
        if self.retained_depth == 0 {
            return;
        }
        if let Some(parent) = self.stack.last_mut() {
            parent.children.push(tag);
        }
    }

    fn feed(&mut self, segment: Segment<'_>, line: usize) -> Result<Progress, String> {
        match segment {
            Segment::Open(name) => {
                let name = name.to_ascii_uppercase();
                if Self::is_of_interest(&name) {
                    self.retained_depth += 1;
                }
                self.stack.push(ComplexTag::new(&name, line));
            }
            Segment::Simple(name, content) => {
                self.attach(Tag::Simple(SimpleTag {
                    name: name.to_ascii_uppercase(),
                    content: content.to_string(),
                    line,
                }));
            }
            Segment::Close(name) => {
                let name = name.to_ascii_uppercase();
                let Some(depth) = self.stack.iter().skip(1).rposition(|tag| tag.name == name)
                else {
                    return Err(format!("closing tag </{name}> without matching open tag"));
                };
                // `rposition` ran over stack[1..].
                let depth = depth + 1;
                while self.stack.len() > depth + 1 {
                    self.close_implicitly();
                }
                self.close_top();
                if self.stack.len() == 1 {
                    return Ok(Progress::Complete);
                }
            }
        }
        Ok(Progress::Continue)
    }

    /// Close the top aggregate as an ended element.
    fn close_top(&mut self) {
        let Some(tag) = self.stack.pop() else {
            return;
        };
        if Self::is_of_interest(&tag.name) {
            self.retained_depth -= 1;
            self.captured.entry(tag.name.clone()).or_insert(tag);
        } else {
            self.attach(Tag::Complex(tag));
        }
    }

    /// A tag with no content and no end tag was an empty leaf: anything read
    /// after it belongs to its parent. Tags of interest are aggregates and
    /// close normally.
    fn close_implicitly(&mut self) {
        if self.stack.last().is_some_and(|tag| Self::is_of_interest(&tag.name)) {
            self.close_top();
            return;
        }
        let Some(tag) = self.stack.pop() else {
            return;
        };
        self.attach(Tag::Simple(SimpleTag {
            name: tag.name,
            content: String::new(),
            line: tag.line,
        }));
        for child in tag.children {
            self.attach(child);
        }
    }

    /// End of input: whatever is still open closes normally.
    fn finish(mut self) -> HashMap<String, ComplexTag> {
        while self.stack.len() > 1 {
            self.close_top();
        }
        self.captured
    }
}

/// Header lines run until the first tag that is not a processing instruction.
fn is_header_line(line: &str) -> bool {
    let line = line.trim_start();
    !line.starts_with('<') || line.starts_with("<?")
}

fn build_tree(path: &Path, text: &str) -> Result<HashMap<String, ComplexTag>, ParseError> {
    let mut builder = TagTreeBuilder::new();
    let mut in_body = false;

    'lines: for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        if !in_body {
            if is_header_line(raw) {
                continue;
            }
            in_body = true;
        }

        let segments = segments(raw)
            .map_err(|message| ParseError::structure(Location::line(path, line_number), message))?;
        for segment in segments {
            let progress = builder.feed(segment, line_number).map_err(|message| {
                ParseError::structure(Location::line(path, line_number), message)
            })?;
            if progress == Progress::Complete {
                break 'lines;
            }
        }
    }

    Ok(builder.finish())
}

fn required_simple<'t>(
    tag: &'t ComplexTag,
    name: &str,
    location: impl Fn() -> Location,
) -> Result<&'t SimpleTag, ParseError> {
    tag.simple(name)
        .ok_or_else(|| ParseError::missing(location(), format!("<{name}> in <{}>", tag.name)))
}

fn numeral_field(tag: &SimpleTag, location: Location) -> Result<Decimal, ParseError> {
    parse_numeral(&clean_numeral(&tag.content))
        .map_err(|e| ParseError::malformed(location, &tag.name, &tag.content, e))
}

/// Parse an OFX 1.x export. `path` is only used to localize errors.
pub fn parse_ofx_sgml_text(path: &Path, text: &str) -> Result<ParsedStatement, ParseError> {
    let mut captured = build_tree(path, strip_bom(text))?;

    let mut take = |name: &str| {
        captured
            .remove(name)
            .ok_or_else(|| ParseError::missing(Location::file(path), format!("<{name}>")))
    };
    let account = take(BANKACCTFROM)?;
    let transactions = take(BANKTRANLIST)?;
    let ledger = take(LEDGERBAL)?;

    let account_number = required_simple(&account, "ACCTID", || Location::line(path, account.line))?;
    if account_number.content.is_empty() {
        return Err(ParseError::missing(
            Location::line(path, account_number.line),
            "account number in <ACCTID>",
        ));
    }

    let balamt = required_simple(&ledger, "BALAMT", || Location::line(path, ledger.line))?;
    let mut running = numeral_field(balamt, Location::line(path, balamt.line))?;

    let extractor = TransactionDateExtractor::new()
        .map_err(|e| ParseError::internal(Location::file(path), e))?;

    let mut lines = Vec::new();
    for (index, trn) in transactions.complex_children().enumerate() {
        let ordinal = index + 1;
        let at = |line: usize| Location::line(path, line).with_transaction(ordinal);

        let dtposted = required_simple(trn, "DTPOSTED", || at(trn.line))?;
        let trnamt = required_simple(trn, "TRNAMT", || at(trn.line))?;
        let memo = required_simple(trn, "MEMO", || at(trn.line))?;

        let posted_on = parse_date_prefix(&dtposted.content, OFX_DATE).map_err(|reason| {
            ParseError::malformed(at(dtposted.line), "DTPOSTED", &dtposted.content, reason)
        })?;
        let amount = numeral_field(trnamt, at(trnamt.line))?;
        let description = unescape_text(&memo.content);

        // The ledger balance is the balance before the first listed transaction.
        let balance = running;
        running += amount;

        lines.push(Line::new(
            posted_on,
            extractor.extract(&description, posted_on),
            amount,
            balance,
            description,
        ));
    }

    Ok(ParsedStatement::new(lines).with_account_number(account_number.content.clone()))
}
