//! Grouped decimal numerals (`#,##0.00`) to and from exact decimals.
//!
//! The pattern is fixed and locale-invariant: `,` groups thousands and `.` is
//! always the decimal point.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumeralError {
    #[error("empty numeral")]
    Empty,
    #[error("no digits in '{0}'")]
    NoDigits(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

/// Strip the quote characters and whitespace some exports wrap amounts in.
pub fn clean_numeral(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '"' | '\'') && !c.is_whitespace())
        .collect()
}

/// Parse the longest numeral prefix of `text`.
///
/// Trailing characters after a valid prefix are ignored, so `12.50CR` is
/// `12.50`. The scale written in the input is kept.
pub fn parse_numeral(text: &str) -> Result<Decimal, NumeralError> {
    if text.is_empty() {
        return Err(NumeralError::Empty);
    }

    let mut chars = text.chars().peekable();
    let mut plain = String::with_capacity(text.len());
    let mut digits = 0;

    if chars.peek() == Some(&'-') {
        plain.push('-');
        chars.next();
    }

    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => {
                plain.push(c);
                digits += 1;
            }
            ',' => {}
            _ => break,
        }
        chars.next();
    }

    if chars.peek() == Some(&'.') {
        chars.next();
        let mut fraction = String::new();
        while let Some(&c) = chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            fraction.push(c);
            chars.next();
        }
        if !fraction.is_empty() {
            if digits == 0 {
                plain.push('0');
            }
            digits += fraction.len();
            plain.push('.');
            plain.push_str(&fraction);
        }
    }

    if digits == 0 {
        return Err(NumeralError::NoDigits(text.to_string()));
    }

    Decimal::from_str(&plain).map_err(|_| NumeralError::OutOfRange(text.to_string()))
}

/// Render `value` as `#,##0.00`, rounding half to even.
pub fn format_numeral(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(2);

    let text = rounded.abs().to_string();
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parses_grouped_numerals() {
        assert_eq!(parse_numeral("1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_numeral("-50.00").unwrap(), dec!(-50.00));
        assert_eq!(parse_numeral("1,000,000").unwrap(), dec!(1000000));
        assert_eq!(parse_numeral(".5").unwrap(), dec!(0.5));
    }

    #[test]
    fn test_keeps_input_scale() {
        assert_eq!(parse_numeral("20.00").unwrap().scale(), 2);
        assert_eq!(parse_numeral("20.5").unwrap().scale(), 1);
    }

    #[test]
    fn test_ignores_trailing_garbage() {
        assert_eq!(parse_numeral("12.50CR").unwrap(), dec!(12.50));
        assert_eq!(parse_numeral("7.").unwrap(), dec!(7));
        assert_eq!(parse_numeral("3.1.4").unwrap(), dec!(3.1));
    }

    #[test]
    fn test_rejects_inputs_without_digits() {
        assert_eq!(parse_numeral(""), Err(NumeralError::Empty));
        assert_eq!(
            parse_numeral("-"),
            Err(NumeralError::NoDigits("-".to_string()))
        );
        assert!(matches!(parse_numeral("abc"), Err(NumeralError::NoDigits(_))));
        assert!(matches!(parse_numeral("+5"), Err(NumeralError::NoDigits(_))));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let huge = "9".repeat(40);
        assert!(matches!(parse_numeral(&huge), Err(NumeralError::OutOfRange(_))));
    }

    #[test]
    fn test_clean_strips_quotes_and_spaces() {
        assert_eq!(clean_numeral("\" 1 234.50 \""), "1234.50");
        assert_eq!(clean_numeral("1\u{a0}234.50"), "1234.50");
    }

    #[test]
    fn test_formats_with_grouping_and_two_decimals() {
        assert_eq!(format_numeral(dec!(1234.56)), "1,234.56");
        assert_eq!(format_numeral(dec!(1234567)), "1,234,567.00");
        assert_eq!(format_numeral(dec!(-950)), "-950.00");
        assert_eq!(format_numeral(dec!(0.125)), "0.12");
        assert_eq!(format_numeral(dec!(0.135)), "0.14");
        assert_eq!(format_numeral(dec!(-0.001)), "0.00");
    }

    #[test]
    fn test_round_trip() {
        for text in ["1,234.56", "0.01", "-12,345,678.90", "999.00"] {
            assert_eq!(format_numeral(parse_numeral(text).unwrap()), text);
        }
    }
}
