//! Purpose: Define the public Rust API boundary for airlookup.
//! Exports: Config, the row source seam, the Airtable client and the fetcher.
//! Role: Public, additive-only surface used by the binary and tests.
//! Invariants: Network access lives behind `RowSource`; callers never build URLs.

mod config;
mod fetch;
mod remote;

pub use crate::core::email::Email;
pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::formula::{FilterFormula, build_filter};
pub use crate::core::record::{FieldSelection, NormalizedRecord, RawRow};
pub use config::{AirtableConfig, DEFAULT_API_URL, DEFAULT_EMAIL_FIELD, MAX_PAGE_SIZE};
pub use fetch::RecordFetcher;
pub use remote::{AirtableClient, RowSource};
