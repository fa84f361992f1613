use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

use super::{Fields, Record, RecordStore, StoreError, RECORD_ID_FIELD};

/// Record store backed by a SheetDB-style REST API over a spreadsheet tab.
pub struct SheetDbStore {
    http_client: Client,
    base_url: String,
    token: Option<String>,
    sheet: Option<String>,
}

#[derive(Debug, Serialize)]
struct RowsPayload<'a> {
    data: &'a [Fields],
}

#[derive(Debug, Serialize)]
struct PatchPayload<'a> {
    data: &'a Fields,
}

impl SheetDbStore {
    pub fn new(
        base_url: String,
        token: Option<String>,
        sheet: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build record store client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            sheet: sheet.filter(|s| !s.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http_client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(sheet) = &self.sheet {
            builder = builder.query(&[("sheet", sheet.as_str())]);
        }
        builder
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder.send().await.map_err(|err| {
            let err = StoreError::from(err);
            error!(operation, error = %err, "record store request failed");
            err
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_string());
        error!(operation, status = status.as_u16(), body = %message, "record store rejected request");
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RecordStore for SheetDbStore {
    async fn create(&self, mut fields: Fields) -> Result<Record, StoreError> {
        let id = match fields.get(RECORD_ID_FIELD).and_then(value_text) {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        fields.insert(RECORD_ID_FIELD.to_string(), Value::String(id.clone()));

        let rows = [fields];
        let builder = self
            .request(Method::POST, "")
            .json(&RowsPayload { data: &rows });
        self.send("create", builder).await?;

        let [fields] = rows;
        Ok(Record { id, fields })
    }

    async fn find(&self, query: &[(&str, &str)]) -> Result<Vec<Record>, StoreError> {
        let builder = self.request(Method::GET, "/search").query(query);
        let rows: Vec<Value> = self.send("find", builder).await?.json().await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(fields) = row else {
                return Err(StoreError::InvalidResponse(
                    "search result row is not an object".into(),
                ));
            };
            match fields.get(RECORD_ID_FIELD).and_then(value_text) {
                Some(id) => records.push(Record { id, fields }),
                None => warn!("skipping record store row without an id column"),
            }
        }
        Ok(records)
    }

    async fn update(&self, id: &str, fields: Fields) -> Result<Record, StoreError> {
        let builder = self
            .request(Method::PATCH, &format!("/id/{id}"))
            .json(&PatchPayload { data: &fields });
        self.send("update", builder).await?;

        Ok(Record {
            id: id.to_string(),
            fields,
        })
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let builder = self.request(Method::DELETE, &format!("/id/{id}"));
        self.send("delete", builder).await?;
        Ok(())
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
