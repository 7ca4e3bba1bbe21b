//! Cloud Firestore backend over the v1 REST API
//!
//! Appends are `POST .../documents/expenses`. The REST API has no push
//! channel, so subscriptions poll the collection listing and publish a new
//! snapshot whenever it differs from the last one published.
//!
//! # Configuration
//!
//! - `project_id` and `api_key` come from the store section of `Config`
//! - `FIRESTORE_EMULATOR_HOST` (e.g. `localhost:8080`) switches to the local
//!   emulator over plain HTTP

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::models::{ExpenseRecord, NewExpense, Snapshot, EXPENSES_COLLECTION};

use super::{LedgerStore, Subscription, Unsubscribe};

/// Production Firestore endpoint
pub const DEFAULT_FIRESTORE_HOST: &str = "https://firestore.googleapis.com";

/// Documents requested per page when listing the collection
const PAGE_SIZE: u32 = 300;

/// Firestore REST backend
#[derive(Clone)]
pub struct FirestoreStore {
    http_client: Client,
    base_url: String,
    project_id: String,
    api_key: Option<String>,
    emulator: bool,
    poll_interval: Duration,
}

impl FirestoreStore {
    /// Create a backend for a project on the given host
    pub fn new(base_url: &str, project_id: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            api_key: None,
            emulator: false,
            poll_interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Create a backend talking to the Firestore emulator at `host:port`
    pub fn emulator(host: &str, project_id: &str) -> Self {
        let mut store = Self::new(&format!("http://{}", host), project_id);
        store.emulator = true;
        store
    }

    /// Build from the store section of the configuration
    pub fn from_config(config: &StoreConfig) -> Self {
        let store = match config.emulator_host.as_deref() {
            Some(host) => Self::emulator(host, &config.project_id),
            None => Self::new(DEFAULT_FIRESTORE_HOST, &config.project_id),
        };
        store
            .with_api_key(&config.api_key)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = (!api_key.is_empty()).then(|| api_key.to_string());
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        // tokio's interval panics on a zero period
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn host(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.base_url, self.project_id, EXPENSES_COLLECTION
        )
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = match self.api_key {
            Some(ref key) => req.query(&[("key", key)]),
            None => req,
        };
        if self.emulator {
            // The emulator treats "owner" as an admin credential that bypasses rules
            req.header("Authorization", "Bearer owner")
        } else {
            req
        }
    }

    /// Read the whole collection, following page tokens
    pub async fn list(&self) -> Result<Snapshot> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .http_client
                .get(self.collection_url())
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token)]);
            }

            let response = self.authorize(req).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Store(format!(
                    "Firestore list error {}: {}",
                    status, body
                )));
            }

            let page: ListDocumentsResponse = response.json().await?;
            for document in page.documents {
                match document.into_record() {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(error = %e, "skipping malformed expense document"),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl LedgerStore for FirestoreStore {
    async fn append(&self, expense: NewExpense) -> Result<ExpenseRecord> {
        if !expense.amount.is_finite() {
            return Err(Error::Store(format!(
                "refusing to store non-finite amount {}",
                expense.amount
            )));
        }

        let document = Document::from_expense(&expense);
        let req = self.http_client.post(self.collection_url()).json(&document);
        let response = self.authorize(req).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Firestore create error {}: {}",
                status, body
            )));
        }

        let created: Document = response.json().await?;
        let record = created.into_record()?;
        debug!(id = %record.id, amount = record.amount, "appended expense to Firestore");

        Ok(record)
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let initial = self.list().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let _ = tx.send(initial.clone());

        let store = self.clone();
        let cancelled = token.clone();
        tokio::spawn(async move {
            store.poll_changes(initial, tx, cancelled).await;
        });

        info!(
            collection = EXPENSES_COLLECTION,
            interval_ms = self.poll_interval.as_millis() as u64,
            "subscribed to Firestore collection"
        );
        Ok(Subscription::new(rx, Unsubscribe::new(token)))
    }

    fn describe(&self) -> String {
        format!("firestore ({}, project {})", self.base_url, self.project_id)
    }
}

impl FirestoreStore {
    /// Poll until cancelled or the subscriber goes away
    async fn poll_changes(
        &self,
        mut last: Snapshot,
        tx: mpsc::UnboundedSender<Snapshot>,
        cancelled: CancellationToken,
    ) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the first immediate tick - the initial snapshot was already sent
        ticker.tick().await;

        loop {
            let listed = tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = tx.closed() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancelled.cancelled() => break,
                        listed = self.list() => listed,
                    }
                }
            };

            match listed {
                Ok(snapshot) if snapshot != last => {
                    debug!(records = snapshot.len(), "expenses collection changed");
                    if tx.send(snapshot.clone()).is_err() {
                        break;
                    }
                    last = snapshot;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to poll expenses collection"),
            }
        }

        debug!("Firestore subscription stopped");
    }
}

/// A Firestore document as sent and received over REST
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

/// Typed Firestore value (only the kinds an expense uses)
///
/// Unknown kinds deserialize to an empty value instead of failing the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Value {
    /// Non-finite doubles travel as the strings `NaN`, `Infinity`, `-Infinity`
    #[serde(default, skip_serializing_if = "Option::is_none", with = "firestore_double")]
    pub double_value: Option<f64>,
    /// Firestore encodes 64-bit integers as strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_value: Option<DateTime<Utc>>,
}

mod firestore_double {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) if v.is_nan() => serializer.serialize_some("NaN"),
            Some(v) if v.is_infinite() && *v > 0.0 => serializer.serialize_some("Infinity"),
            Some(v) if v.is_infinite() => serializer.serialize_some("-Infinity"),
            Some(v) => serializer.serialize_some(v),
            None => serializer.serialize_none(),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => None,
            Some(Raw::Number(v)) => Some(v),
            Some(Raw::Text(text)) => match text.as_str() {
                "NaN" => Some(f64::NAN),
                "Infinity" => Some(f64::INFINITY),
                "-Infinity" => Some(f64::NEG_INFINITY),
                other => other.parse().ok(),
            },
        })
    }
}

impl Value {
    pub fn double(value: f64) -> Self {
        Self {
            double_value: Some(value),
            ..Default::default()
        }
    }

    pub fn string(value: &str) -> Self {
        Self {
            string_value: Some(value.to_string()),
            ..Default::default()
        }
    }

    pub fn timestamp(value: DateTime<Utc>) -> Self {
        Self {
            timestamp_value: Some(value),
            ..Default::default()
        }
    }

    fn as_f64(&self) -> Option<f64> {
        self.double_value
            .or_else(|| self.integer_value.as_deref()?.parse::<i64>().ok().map(|i| i as f64))
    }
}

impl Document {
    pub fn from_expense(expense: &NewExpense) -> Self {
        let mut fields = HashMap::new();
        fields.insert("amount".to_string(), Value::double(expense.amount));
        fields.insert("note".to_string(), Value::string(&expense.note));
        fields.insert("createdAt".to_string(), Value::timestamp(expense.created_at));
        Self {
            name: None,
            fields,
            create_time: None,
        }
    }

    /// Document id: the last segment of the resource name
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref()?.rsplit('/').next().filter(|s| !s.is_empty())
    }

    pub fn into_record(self) -> Result<ExpenseRecord> {
        let id = self
            .id()
            .ok_or_else(|| Error::Store("document has no name".into()))?
            .to_string();

        let amount = self
            .fields
            .get("amount")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::Store(format!("document {} has no numeric amount", id)))?;
        if !amount.is_finite() {
            return Err(Error::Store(format!(
                "document {} has non-finite amount {}",
                id, amount
            )));
        }

        let note = self
            .fields
            .get("note")
            .and_then(|v| v.string_value.clone())
            .unwrap_or_default();

        let created_at = self
            .fields
            .get("createdAt")
            .and_then(|v| v.timestamp_value)
            .or(self.create_time)
            .ok_or_else(|| Error::Store(format!("document {} has no creation time", id)))?;

        Ok(ExpenseRecord {
            id,
            amount,
            note,
            created_at,
        })
    }
}

/// Response of a collection listing
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
