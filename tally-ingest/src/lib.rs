//! tally-ingest: bank statement ingestion (CSV dialects, OFX 1.x SGML, OFX 2.x XML)
//! normalized into one canonical statement model.

mod dates;
pub mod error;
pub mod numeral;
pub mod parsers;
pub mod registry;
pub mod source;
pub mod types;

pub use error::{ErrorKind, Location, ParseError};
pub use numeral::{NumeralError, clean_numeral, format_numeral, parse_numeral};
pub use parsers::StatementParser;
pub use registry::StatementFormat;
pub use types::{Line, ParsedStatement};
