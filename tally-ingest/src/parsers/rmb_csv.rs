//! RMB / FNB-style CSV statement parser
//!
//! The export opens with a fixed seven line preamble:
//!   ACCOUNT TRANSACTION HISTORY
//!   Statement Period,01 January 2022 to 31 January 2022
//!   Account Holder,MR J SMITH
//!   Account Number,62000000001
//!   Opening Balance,"1,000.00"
//!   (blank)
//!   Date,Amount,Balance,Description
//!
//! followed by rows such as
//!   2022/01/05,-50.00,950.00,POS PURCHASE WOOLWORTHS 28 DEC
//!
//! The purchase date is recovered from the trailing `DD MON` token of the
//! description when present.

use csv::StringRecord;
use std::path::Path;

use crate::dates::{TransactionDateExtractor, midnight};
use crate::error::{Location, ParseError};
use crate::parsers::StatementParser;
use crate::parsers::csv_rows::{RowContext, reader};
use crate::source::{read_source, strip_bom};
use crate::types::{Line, ParsedStatement};

pub const EXPECTED_FIRST_LINE: &str = "ACCOUNT TRANSACTION HISTORY";

const HEADER_LINES: usize = 7;
const ACCOUNT_HOLDER_LINE: usize = 3;
const ACCOUNT_NUMBER_LINE: usize = 4;
const COLUMNS: usize = 4;

const DATE_COLUMN: usize = 0;
const AMOUNT_COLUMN: usize = 1;
const BALANCE_COLUMN: usize = 2;
const DESCRIPTION_COLUMN: usize = 3;

const DATE_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, Copy, Default)]
pub struct RmbCsvParser;

impl StatementParser for RmbCsvParser {
    fn parse(&self, source: &Path) -> Result<ParsedStatement, ParseError> {
        parse_rmb_csv_text(source, &read_source(source)?)
    }
}

/// Preamble lines carry `Label,Value`; fall back to the whole line when the
/// label is missing.
fn preamble_value(record: &StringRecord) -> String {
    record
        .get(1)
        .or_else(|| record.get(0))
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Parse an RMB/FNB-style export. `path` is only used to localize errors.
pub fn parse_rmb_csv_text(path: &Path, text: &str) -> Result<ParsedStatement, ParseError> {
    let text = strip_bom(text);
    let first_line = text.lines().next().unwrap_or("").trim_end();
    if first_line != EXPECTED_FIRST_LINE {
        return Err(ParseError::unsupported(
            Location::line(path, 1),
            format!("expected '{EXPECTED_FIRST_LINE}' but found '{first_line}'"),
        ));
    }

    let extractor = TransactionDateExtractor::new()
        .map_err(|e| ParseError::internal(Location::file(path), e))?;

    let mut ctx = RowContext::new(path, COLUMNS);
    let mut account_holder = None;
    let mut account_number = None;
    let mut lines = Vec::new();

    for result in reader(text).records() {
        let record = ctx.advance(result)?;
        match ctx.line() {
            ACCOUNT_HOLDER_LINE => account_holder = Some(preamble_value(&record)),
            ACCOUNT_NUMBER_LINE => account_number = Some(preamble_value(&record)),
            line if line <= HEADER_LINES => {}
            _ if RowContext::is_blank(&record) => {}
            _ => {
                let posted = midnight(ctx.date(&record, DATE_COLUMN, "date", DATE_FORMAT)?);
                let amount = ctx.numeral(&record, AMOUNT_COLUMN, "amount")?;
                let balance = ctx.numeral(&record, BALANCE_COLUMN, "balance")?;
                let description = ctx.field(&record, DESCRIPTION_COLUMN, "description")?;

                lines.push(Line::new(
                    posted,
                    extractor.extract(description, posted),
                    amount,
                    balance,
                    description,
                ));
                ctx.finish_row(&record);
            }
        }
    }

    let mut statement = ParsedStatement::new(lines);
    statement.account_holder = account_holder;
    statement.account_number = account_number;
    Ok(statement)
}
