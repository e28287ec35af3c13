//! Date helpers shared by the statement parsers.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

pub(crate) const OFX_DATE: (usize, &str) = (8, "%Y%m%d");
pub(crate) const OFX_DATE_TIME: (usize, &str) = (14, "%Y%m%d%H%M%S");

/// Parse the fixed-width prefix of `text` with `format`.
///
/// OFX dates carry optional fractional seconds and a bracketed zone after the
/// digits (`20220105120000.000[+2:SAST]`); only the prefix is significant.
pub(crate) fn parse_date_prefix(
    text: &str,
    (width, format): (usize, &str),
) -> Result<NaiveDateTime, String> {
    let text = text.trim();
    let prefix = text
        .get(..width)
        .ok_or_else(|| format!("expected at least {width} digits"))?;

    if width > 8 {
        NaiveDateTime::parse_from_str(prefix, format).map_err(|e| e.to_string())
    } else {
        NaiveDate::parse_from_str(prefix, format)
            .map(midnight)
            .map_err(|e| e.to_string())
    }
}

pub(crate) fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn month_number(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_ascii_uppercase().as_str() {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(month)
}

/// Pulls the purchase date out of descriptions such as
/// `POS PURCHASE WOOLWORTHS 28 DEC`.
///
/// Built once per parse call.
pub(crate) struct TransactionDateExtractor {
    trailing_day_month: Regex,
}

impl TransactionDateExtractor {
    pub(crate) fn new() -> Result<Self, regex::Error> {
        let trailing_day_month = Regex::new(
            r"(?i)(?:^|\s)(?P<day>\d{1,2})\s*(?P<month>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s*$",
        )?;
        Ok(Self { trailing_day_month })
    }

    /// The year comes from `posted_on`. A December token on a January posting
    /// belongs to the previous year.
    pub(crate) fn extract(
        &self,
        description: &str,
        posted_on: NaiveDateTime,
    ) -> Option<NaiveDateTime> {
        let caps = self.trailing_day_month.captures(description)?;
        let day: u32 = caps["day"].parse().ok()?;
        let month = month_number(&caps["month"])?;

        let mut year = posted_on.year();
        if posted_on.month() == 1 && month == 12 {
            year -= 1;
        }

        NaiveDate::from_ymd_opt(year, month, day).map(midnight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posted(y: i32, m: u32, d: u32) -> NaiveDateTime {
        midnight(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_cross_year_correction() {
        let extractor = TransactionDateExtractor::new().unwrap();
        let date = extractor
            .extract("POS PURCHASE WOOLWORTHS 28 DEC", posted(2022, 1, 5))
            .unwrap();
        assert_eq!(date, posted(2021, 12, 28));
    }

    #[test]
    fn test_same_year_and_case_insensitive() {
        let extractor = TransactionDateExtractor::new().unwrap();
        assert_eq!(
            extractor.extract("Card purchase Checkers 3 mar", posted(2022, 3, 4)),
            Some(posted(2022, 3, 3))
        );
        // Only January postings roll back a year.
        assert_eq!(
            extractor.extract("Transfer 30 DEC", posted(2022, 2, 1)),
            Some(posted(2022, 12, 30))
        );
    }

    #[test]
    fn test_absent_or_impossible_dates() {
        let extractor = TransactionDateExtractor::new().unwrap();
        assert_eq!(extractor.extract("Monthly fee", posted(2022, 1, 5)), None);
        assert_eq!(extractor.extract("Refund 31 FEB", posted(2022, 3, 1)), None);
        // Token must be trailing.
        assert_eq!(extractor.extract("28 DEC transfer", posted(2022, 1, 5)), None);
        // Month must stand alone rather than start a word.
        assert_eq!(extractor.extract("Order 12 DECEMBERIST", posted(2022, 1, 5)), None);
    }

    #[test]
    fn test_date_prefix_tolerates_suffixes() {
        assert_eq!(
            parse_date_prefix("20220105120000.000[+2:SAST]", OFX_DATE).unwrap(),
            posted(2022, 1, 5)
        );
        assert_eq!(
            parse_date_prefix("20220105123045[+2:SAST]", OFX_DATE_TIME).unwrap(),
            posted(2022, 1, 5).date().and_hms_opt(12, 30, 45).unwrap()
        );
        assert!(parse_date_prefix("2022010", OFX_DATE).is_err());
        assert!(parse_date_prefix("20221305", OFX_DATE).is_err());
    }
}
