use anyhow::{Context, Result};
use tally_ingest::{ParsedStatement, StatementFormat, format_numeral};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn render_json(statement: &ParsedStatement) -> Result<String> {
    serde_json::to_string_pretty(statement).context("serialize statement")
}

pub fn render_table(format: StatementFormat, statement: &ParsedStatement) -> String {
    let mut out = format!("Format:         {}\n", format.label());
    if let Some(holder) = &statement.account_holder {
        out.push_str(&format!("Account holder: {holder}\n"));
    }
    out.push_str(&format!(
        "Account number: {}\n",
        statement.account_number.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("Lines:          {}\n\n", statement.lines.len()));

    out.push_str(&format!(
        "{:<10}  {:<10}  {:>14}  {:>14}  DESCRIPTION\n",
        "POSTED", "TRANSACTED", "AMOUNT", "BALANCE"
    ));
    for line in &statement.lines {
        let transacted = line
            .transaction_date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<10}  {:<10}  {:>14}  {:>14}  {}\n",
            line.posted_on.format(DATE_FORMAT),
            transacted,
            format_numeral(line.amount),
            format_numeral(line.balance),
            line.description
        ));
    }
    out
}
