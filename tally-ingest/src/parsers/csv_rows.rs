//! Record plumbing shared by the CSV dialects: reader setup, line tracking and
//! localized field access.

use chrono::{NaiveDate, NaiveTime};
use csv::StringRecord;
use rust_decimal::Decimal;
use std::path::Path;

use crate::error::{Location, ParseError};
use crate::numeral::{clean_numeral, parse_numeral};

/// Preambles vary in width, so rows are read without headers and without a
/// fixed record length.
pub(super) fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// Per-call scratch state for one CSV parse.
pub(super) struct RowContext<'a> {
    path: &'a Path,
    columns: usize,
    /// Fields of every completed data row so far.
    fields_seen: usize,
    line: usize,
}

impl<'a> RowContext<'a> {
    pub(super) fn new(path: &'a Path, columns: usize) -> Self {
        Self {
            path,
            columns,
            fields_seen: 0,
            line: 0,
        }
    }

    /// 1-based source line of the current record.
    pub(super) fn line(&self) -> usize {
        self.line
    }

    /// Unwrap the next record, remembering which line it started on.
    pub(super) fn advance(
        &mut self,
        result: Result<StringRecord, csv::Error>,
    ) -> Result<StringRecord, ParseError> {
        match result {
            Ok(record) => {
                if let Some(pos) = record.position() {
                    self.line = pos.line() as usize;
                }
                Ok(record)
            }
            Err(err) => {
                let line = err
                    .position()
                    .map(|pos| pos.line() as usize)
                    .unwrap_or(self.line + 1);
                Err(ParseError::structure(
                    Location::line(self.path, line),
                    format!("unreadable CSV record: {err}"),
                ))
            }
        }
    }

    /// Rows holding only whitespace are treated like blank lines.
    pub(super) fn is_blank(record: &StringRecord) -> bool {
        record.iter().all(|field| field.trim().is_empty())
    }

    pub(super) fn finish_row(&mut self, record: &StringRecord) {
        self.fields_seen += record.len();
    }

    fn location(&self, column: usize) -> Location {
        Location::line(self.path, self.line).with_field((self.fields_seen + column) % self.columns)
    }

    pub(super) fn malformed(
        &self,
        column: usize,
        name: &str,
        value: &str,
        reason: impl std::fmt::Display,
    ) -> ParseError {
        ParseError::malformed(self.location(column), name, value, reason)
    }

    pub(super) fn field<'r>(
        &self,
        record: &'r StringRecord,
        column: usize,
        name: &str,
    ) -> Result<&'r str, ParseError> {
        record.get(column).ok_or_else(|| {
            self.malformed(
                column,
                name,
                "",
                format!("row has {} fields, expected {}", record.len(), self.columns),
            )
        })
    }

    pub(super) fn numeral(
        &self,
        record: &StringRecord,
        column: usize,
        name: &str,
    ) -> Result<Decimal, ParseError> {
        let raw = self.field(record, column, name)?;
        parse_numeral(&clean_numeral(raw)).map_err(|e| self.malformed(column, name, raw, e))
    }

    pub(super) fn date(
        &self,
        record: &StringRecord,
        column: usize,
        name: &str,
        format: &str,
    ) -> Result<NaiveDate, ParseError> {
        let raw = self.field(record, column, name)?;
        NaiveDate::parse_from_str(raw.trim(), format)
            .map_err(|e| self.malformed(column, name, raw, e))
    }

    /// Try each format in turn; the last failure is reported.
    pub(super) fn time(
        &self,
        record: &StringRecord,
        column: usize,
        name: &str,
        formats: &[&str],
    ) -> Result<NaiveTime, ParseError> {
        let raw = self.field(record, column, name)?;
        let mut last_err = None;
        for format in formats {
            match NaiveTime::parse_from_str(raw.trim(), format) {
                Ok(time) => return Ok(time),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => self.malformed(column, name, raw, e),
            None => self.malformed(column, name, raw, "no time format configured"),
        })
    }
}
