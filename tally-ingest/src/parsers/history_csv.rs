//! Transaction history CSV parser
//!
//! Expected rows after a single header line:
//!   Date,Time,Description 1,Description 2,Description 3,Amount,Balance
//!   2022/01/05,08:15:00,POS PURCHASE,WOOLWORTHS,CAPE TOWN,-50.00,"1,950.00"

use std::path::Path;

use crate::error::ParseError;
use crate::parsers::StatementParser;
use crate::parsers::csv_rows::{RowContext, reader};
use crate::source::read_source;
use crate::types::{Line, ParsedStatement};

const HEADER_LINES: usize = 1;
const COLUMNS: usize = 7;

const DATE_COLUMN: usize = 0;
const TIME_COLUMN: usize = 1;
const DESCRIPTION_COLUMNS: [usize; 3] = [2, 3, 4];
const AMOUNT_COLUMN: usize = 5;
const BALANCE_COLUMN: usize = 6;

const DATE_FORMAT: &str = "%Y/%m/%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryCsvParser;

impl StatementParser for HistoryCsvParser {
    fn parse(&self, source: &Path) -> Result<ParsedStatement, ParseError> {
        parse_history_csv_text(source, &read_source(source)?)
    }
}

/// Parse a transaction history export. `path` is only used to localize errors.
pub fn parse_history_csv_text(path: &Path, text: &str) -> Result<ParsedStatement, ParseError> {
    let mut ctx = RowContext::new(path, COLUMNS);
    let mut lines = Vec::new();

    for result in reader(text).records() {
        let record = ctx.advance(result)?;
        if ctx.line() <= HEADER_LINES || RowContext::is_blank(&record) {
            continue;
        }

        let date = ctx.date(&record, DATE_COLUMN, "date", DATE_FORMAT)?;
        let time = ctx.time(&record, TIME_COLUMN, "time", &TIME_FORMATS)?;

        let mut description = Vec::with_capacity(DESCRIPTION_COLUMNS.len());
        for column in DESCRIPTION_COLUMNS {
            description.push(ctx.field(&record, column, "description")?);
        }

        let amount = ctx.numeral(&record, AMOUNT_COLUMN, "amount")?;
        let balance = ctx.numeral(&record, BALANCE_COLUMN, "balance")?;

        lines.push(Line::new(
            date.and_time(time),
            None,
            amount,
            balance,
            description.join(","),
        ));
        ctx.finish_row(&record);
    }

    Ok(ParsedStatement::new(lines))
}
