//! Purpose: Run the email lookup pipeline: filter, fetch one page, reshape.
//! Exports: `RecordFetcher`.
//! Role: Shared by the HTTP handler and the `fetch` CLI command.
//! Invariants: Exactly one `RowSource::fetch_rows` call per `fetch_records`.
//! Invariants: Raw-string entry points reject bad input before touching the source.

use super::config::AirtableConfig;
use super::remote::{AirtableClient, RowSource};
use crate::core::email::Email;
use crate::core::error::Error;
use crate::core::formula::build_filter;
use crate::core::record::{FieldSelection, NormalizedRecord, normalize_rows};
use std::sync::Arc;

#[derive(Clone)]
pub struct RecordFetcher {
    source: Arc<dyn RowSource>,
    email_field: String,
    fields: FieldSelection,
}

impl RecordFetcher {
    pub fn new(source: Arc<dyn RowSource>, config: &AirtableConfig) -> Self {
        Self {
            source,
            email_field: config.email_field.clone(),
            fields: config.fields.clone(),
        }
    }

    /// Fetcher backed by the live Airtable client.
    pub fn airtable(config: &AirtableConfig) -> Result<Self, Error> {
        let client = AirtableClient::new(config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn fetch_records(&self, email: &Email) -> Result<Vec<NormalizedRecord>, Error> {
        let filter = build_filter(&self.email_field, email);
        let rows = self.source.fetch_rows(&filter)?;
        let records = normalize_rows(rows, &self.email_field, &self.fields)?;
        tracing::debug!(count = records.len(), "records normalized");
        Ok(records)
    }

    /// Validate `raw` and fetch; invalid input never reaches the row source.
    pub fn fetch_records_for(&self, raw: &str) -> Result<Vec<NormalizedRecord>, Error> {
        let email = Email::parse(raw)?;
        self.fetch_records(&email)
    }
}

#[cfg(test)]
mod tests {
    use super::RecordFetcher;
    use crate::api::config::AirtableConfig;
    use crate::api::remote::RowSource;
    use crate::core::error::{Error, ErrorKind};
    use crate::core::formula::FilterFormula;
    use crate::core::record::{FieldSelection, RawRow};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    struct StubSource {
        rows: Vec<RawRow>,
        calls: Mutex<Vec<String>>,
    }

    impl StubSource {
        fn new(rows: Vec<Value>) -> Arc<Self> {
            let rows = rows
                .into_iter()
                .map(|value| match value {
                    Value::Object(map) => map,
                    _ => panic!("row must be an object"),
                })
                .collect();
            Arc::new(Self {
                rows,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl RowSource for StubSource {
        fn fetch_rows(&self, filter: &FilterFormula) -> Result<Vec<RawRow>, Error> {
            self.calls.lock().expect("lock").push(filter.to_string());
            Ok(self.rows.clone())
        }
    }

    fn config() -> AirtableConfig {
        AirtableConfig::new("key", "appXYZ", "Contacts")
    }

    #[test]
    fn invalid_email_makes_no_upstream_call() {
        let source = StubSource::new(vec![json!({"Email": "a@b.com"})]);
        let fetcher = RecordFetcher::new(source.clone(), &config());
        for raw in ["", "nope", "a\"@b.com", "x@y"] {
            let err = fetcher.fetch_records_for(raw).expect_err(raw);
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert!(source.calls().is_empty());
    }

    #[test]
    fn single_match_scenario() {
        let source = StubSource::new(vec![json!({
            "Email": "test1@test1.com",
            "Name": "Acme",
            "Phone": "555-0100",
        })]);
        let fetcher = RecordFetcher::new(source.clone(), &config());
        let records = fetcher
            .fetch_records_for("test1@test1.com")
            .expect("records");

        assert_eq!(
            serde_json::to_value(&records).expect("json"),
            json!([{
                "email": "test1@test1.com",
                "data": {"Email": "test1@test1.com", "Name": "Acme", "Phone": "555-0100"},
            }])
        );
        assert_eq!(source.calls(), vec!["{Email}=\"test1@test1.com\"".to_string()]);
    }

    #[test]
    fn zero_matches_is_empty_not_error() {
        let source = StubSource::new(Vec::new());
        let fetcher = RecordFetcher::new(source.clone(), &config());
        let records = fetcher.fetch_records_for("none@example.com").expect("empty");
        assert!(records.is_empty());
        assert_eq!(source.calls().len(), 1);
    }

    #[test]
    fn allow_list_revision_limits_data() {
        let source = StubSource::new(vec![json!({
            "Email": "test1@test1.com",
            "Name": "Acme",
            "Phone": "555-0100",
            "Internal": "hidden",
        })]);
        let config = config().with_fields(FieldSelection::from_list(vec![
            "Email".to_string(),
            "Name".to_string(),
        ]));
        let fetcher = RecordFetcher::new(source, &config);
        let records = fetcher.fetch_records_for("test1@test1.com").expect("records");
        assert_eq!(
            Value::Object(records[0].data.clone()),
            json!({"Email": "test1@test1.com", "Name": "Acme"})
        );
    }

    #[test]
    fn malformed_rows_surface_as_upstream_errors() {
        let source = StubSource::new(vec![json!({"Name": "No email"})]);
        let fetcher = RecordFetcher::new(source, &config());
        let err = fetcher
            .fetch_records_for("test1@test1.com")
            .expect_err("shape");
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn source_errors_pass_through() {
        struct Failing;
        impl RowSource for Failing {
            fn fetch_rows(&self, _filter: &FilterFormula) -> Result<Vec<RawRow>, Error> {
                Err(Error::new(ErrorKind::Upstream)
                    .with_message("boom")
                    .with_status(502))
            }
        }
        let fetcher = RecordFetcher::new(Arc::new(Failing), &config());
        let err = fetcher.fetch_records_for("a@b.com").expect_err("upstream");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.status(), Some(502));
    }
}
