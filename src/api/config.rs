//! Purpose: Hold the resolved Airtable connection settings.
//! Exports: `AirtableConfig`, `DEFAULT_API_URL`, `DEFAULT_EMAIL_FIELD`, `MAX_PAGE_SIZE`.
//! Role: Explicit, read-only configuration passed to the client and fetcher.
//! Invariants: `validate` rejects blank credentials before any request is made.
//! Invariants: The API key is redacted from `Debug` output.

use crate::core::error::{Error, ErrorKind};
use crate::core::formula::validate_field_name;
use crate::core::record::FieldSelection;
use std::fmt;

pub const DEFAULT_API_URL: &str = "https://api.airtable.com";
pub const DEFAULT_EMAIL_FIELD: &str = "Email";
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    pub table: String,
    pub api_url: String,
    pub email_field: String,
    pub fields: FieldSelection,
    pub page_size: u32,
}

impl AirtableConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_id: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_id: base_id.into(),
            table: table.into(),
            api_url: DEFAULT_API_URL.to_string(),
            email_field: DEFAULT_EMAIL_FIELD.to_string(),
            fields: FieldSelection::All,
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_email_field(mut self, field: impl Into<String>) -> Self {
        self.email_field = field.into();
        self
    }

    pub fn with_fields(mut self, fields: FieldSelection) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        require("API key", "AIRTABLE_API_KEY", &self.api_key)?;
        require("base id", "AIRTABLE_BASE_ID", &self.base_id)?;
        require("table name", "AIRTABLE_TABLE_NAME", &self.table)?;
        validate_field_name(&self.email_field)?;
        if let FieldSelection::Only(fields) = &self.fields {
            for field in fields {
                validate_field_name(field)?;
            }
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!("page size must be between 1 and {MAX_PAGE_SIZE}")));
        }
        Ok(())
    }
}

impl fmt::Debug for AirtableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableConfig")
            .field("api_key", &"<redacted>")
            .field("base_id", &self.base_id)
            .field("table", &self.table)
            .field("api_url", &self.api_url)
            .field("email_field", &self.email_field)
            .field("fields", &self.fields)
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn require(label: &str, env_var: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::new(ErrorKind::Config)
            .with_message(format!("missing Airtable {label}"))
            .with_hint(format!("Set {env_var} or pass the matching flag.")));
    }
    Ok(())
}
