use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

/// Normalized output of statement parsers (bank-agnostic)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedStatement {
    /// Only exposed by statements that print the holder in their preamble.
    pub account_holder: Option<String>,
    pub account_number: Option<String>,
    pub lines: Vec<Line>,
}

impl ParsedStatement {
    pub fn new(lines: Vec<Line>) -> Self {
        Self {
            account_holder: None,
            account_number: None,
            lines,
        }
    }

    pub fn with_account_number(mut self, account_number: impl Into<String>) -> Self {
        self.account_number = Some(account_number.into());
        self
    }

    pub fn with_account_holder(mut self, account_holder: impl Into<String>) -> Self {
        self.account_holder = Some(account_holder.into());
        self
    }

    /// Balance after the last line in output order, if there are any lines.
    pub fn closing_balance(&self) -> Option<Decimal> {
        self.lines.last().map(|line| line.balance)
    }
}

/// One transaction on a statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    /// Date the bank recorded the transaction (local wall-clock time).
    pub posted_on: NaiveDateTime,
    /// Date the purchase or transfer happened, when the statement says so.
    pub transaction_date: Option<NaiveDateTime>,
    /// Negative means debit; positive means credit.
    pub amount: Decimal,
    /// Running balance after this line.
    pub balance: Decimal,
    pub description: String,
}

impl Line {
    pub fn new(
        posted_on: NaiveDateTime,
        transaction_date: Option<NaiveDateTime>,
        amount: Decimal,
        balance: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            posted_on,
            transaction_date,
            amount,
            balance,
            description: description.into(),
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}
