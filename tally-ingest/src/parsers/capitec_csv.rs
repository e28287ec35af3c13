//! Capitec-style CSV statement parser
//!
//! Two preamble lines precede the rows:
//!   Nr,Account,Posting Date,Transaction Date,Description,Debit,Credit,Balance
//!   1,1234567890,05/01/2022,04/01/2022,Card purchase Checkers,50.00,,950.00
//!
//! Debits and credits live in separate columns and are folded into one signed
//! amount. The account number is taken from the first data row.

use std::path::Path;

use crate::dates::midnight;
use crate::error::ParseError;
use crate::parsers::StatementParser;
use crate::parsers::csv_rows::{RowContext, reader};
use crate::source::read_source;
use crate::types::{Line, ParsedStatement};

const HEADER_LINES: usize = 2;
const COLUMNS: usize = 8;

const ACCOUNT_COLUMN: usize = 1;
const POSTING_DATE_COLUMN: usize = 2;
const TRANSACTION_DATE_COLUMN: usize = 3;
const DESCRIPTION_COLUMN: usize = 4;
const DEBIT_COLUMN: usize = 5;
const CREDIT_COLUMN: usize = 6;
const BALANCE_COLUMN: usize = 7;

const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, Default)]
pub struct CapitecCsvParser;

impl StatementParser for CapitecCsvParser {
    fn parse(&self, source: &Path) -> Result<ParsedStatement, ParseError> {
        parse_capitec_csv_text(source, &read_source(source)?)
    }
}

/// Parse a Capitec-style export. `path` is only used to localize errors.
pub fn parse_capitec_csv_text(path: &Path, text: &str) -> Result<ParsedStatement, ParseError> {
    let mut ctx = RowContext::new(path, COLUMNS);
    let mut account_number: Option<String> = None;
    let mut lines = Vec::new();

    for result in reader(text).records() {
        let record = ctx.advance(result)?;
        if ctx.line() <= HEADER_LINES || RowContext::is_blank(&record) {
            continue;
        }

        if account_number.is_none() {
            let account = ctx.field(&record, ACCOUNT_COLUMN, "account")?;
            account_number = Some(account.trim().to_string());
        }

        let posted = ctx.date(&record, POSTING_DATE_COLUMN, "posting date", DATE_FORMAT)?;
        let transacted = ctx.date(
            &record,
            TRANSACTION_DATE_COLUMN,
            "transaction date",
            DATE_FORMAT,
        )?;
        let description = ctx.field(&record, DESCRIPTION_COLUMN, "description")?;

        let debit = ctx.field(&record, DEBIT_COLUMN, "debit")?;
        let amount = if debit.trim().is_empty() {
            ctx.numeral(&record, CREDIT_COLUMN, "credit")?
        } else {
            -ctx.numeral(&record, DEBIT_COLUMN, "debit")?
        };
        let balance = ctx.numeral(&record, BALANCE_COLUMN, "balance")?;

        lines.push(Line::new(
            midnight(posted),
            Some(midnight(transacted)),
            amount,
            balance,
            description,
        ));
        ctx.finish_row(&record);
    }

    let mut statement = ParsedStatement::new(lines);
    statement.account_number = account_number;
    Ok(statement)
}
