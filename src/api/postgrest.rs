use super::{RemoteLayout, RemoteStore};
use crate::error::{NexusError, PG_UNDEFINED_TABLE, PGRST_NO_ROWS, PGRST_NO_TABLE, PostgrestError};
use crate::types::counter::CountOnly;
use crate::types::{CounterRow, NewQuote, Quote};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_RANGE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::json;
use tracing::debug;
use url::Url;

const PREFER: &str = "Prefer";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Stateless client for the hosted REST API (`{base}/rest/v1/{table}`).
pub struct PostgrestStore {
    client: reqwest::Client,
    rest_base: Url,
    api_key: String,
    layout: RemoteLayout,
}

impl PostgrestStore {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        layout: RemoteLayout,
    ) -> Result<Self, NexusError> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let rest_base = Url::parse(&base)?.join("rest/v1/")?;
        Ok(Self {
            client,
            rest_base,
            api_key: api_key.to_string(),
            layout,
        })
    }

    fn request(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<RequestBuilder, NexusError> {
        let mut url = self.rest_base.join(table)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key))
    }

    fn counter_filter(&self) -> (&'static str, String) {
        ("id", format!("eq.{}", self.layout.counter_id))
    }
}

/// Turn a non-2xx response into `NexusError::Remote` with the decoded PostgREST body.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, NexusError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<PostgrestError>(&text).unwrap_or_else(|_| PostgrestError {
        message: (!text.is_empty()).then_some(text),
        ..Default::default()
    });
    debug!(status = %status, code = ?body.code, "remote store rejected request");
    Err(NexusError::Remote { status, body })
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>, NexusError> {
        let resp = self
            .request(
                Method::GET,
                &self.layout.quotes_table,
                &[("select", "*".into()), ("order", "id.asc".into())],
            )?
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn insert_quote(&self, quote: &NewQuote) -> Result<(), NexusError> {
        let resp = self
            .request(Method::POST, &self.layout.quotes_table, &[])?
            .header(PREFER, "return=minimal")
            .json(&[quote])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn update_quote(&self, id: i64, quote: &NewQuote) -> Result<(), NexusError> {
        let resp = self
            .request(
                Method::PATCH,
                &self.layout.quotes_table,
                &[("id", format!("eq.{id}"))],
            )?
            .header(PREFER, "return=representation")
            .json(quote)
            .send()
            .await?;
        let rows: Vec<Quote> = check(resp).await?.json().await?;
        if rows.is_empty() {
            return Err(NexusError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_quote(&self, id: i64) -> Result<(), NexusError> {
        let resp = self
            .request(
                Method::DELETE,
                &self.layout.quotes_table,
                &[("id", format!("eq.{id}"))],
            )?
            .header(PREFER, "return=representation")
            .send()
            .await?;
        let rows: Vec<Quote> = check(resp).await?.json().await?;
        if rows.is_empty() {
            return Err(NexusError::NotFound(id));
        }
        Ok(())
    }

    async fn count_quotes(&self) -> Result<u64, NexusError> {
        let resp = self
            .request(
                Method::HEAD,
                &self.layout.quotes_table,
                &[("select", "id".into())],
            )?
            .header(PREFER, "count=exact")
            .send()
            .await?;
        let resp = check(resp).await?;
        let total = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .unwrap_or(0);
        Ok(total)
    }

    async fn fetch_counter(&self) -> Result<Option<u64>, NexusError> {
        let resp = self
            .request(
                Method::GET,
                &self.layout.stats_table,
                &[("select", "count".into()), self.counter_filter()],
            )?
            .header(ACCEPT, SINGLE_OBJECT)
            .send()
            .await?;
        match check(resp).await {
            Ok(resp) => {
                let row: CountOnly = resp.json().await?;
                Ok(Some(row.count))
            }
            Err(e) if e.remote_code() == Some(PGRST_NO_ROWS) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert_counter(&self, count: u64) -> Result<Option<u64>, NexusError> {
        let row = CounterRow {
            id: self.layout.counter_id,
            count,
        };
        let resp = self
            .request(Method::POST, &self.layout.stats_table, &[])?
            .header(PREFER, "return=representation")
            .json(&[row])
            .send()
            .await?;
        let rows: Vec<CounterRow> = check(resp).await?.json().await?;
        Ok(rows.first().map(|r| r.count))
    }

    async fn update_counter(&self, count: u64) -> Result<(), NexusError> {
        let resp = self
            .request(
                Method::PATCH,
                &self.layout.stats_table,
                &[self.counter_filter()],
            )?
            .header(PREFER, "return=minimal")
            .json(&json!({ "count": count }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn counter_table_exists(&self) -> Result<bool, NexusError> {
        let resp = self
            .request(
                Method::GET,
                &self.layout.stats_table,
                &[("select", "id".into()), ("limit", "0".into())],
            )?
            .send()
            .await?;
        match check(resp).await {
            Ok(_) => Ok(true),
            Err(NexusError::Remote { status, body })
                if status == StatusCode::NOT_FOUND
                    || matches!(
                        body.code.as_deref(),
                        Some(PGRST_NO_TABLE) | Some(PG_UNDEFINED_TABLE)
                    ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
