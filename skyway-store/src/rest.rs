//! Query client for the hosted database's REST interface.
//!
//! Filters follow the PostgREST conventions the hosted platform exposes:
//! `?pnr=eq.ABC234&order=created_at.desc&limit=50`. Writes ask for the
//! affected rows back with `Prefer: return=representation`.

use std::fmt::Display;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::StoreError;

const SERVICE: &str = "datastore";

#[derive(Clone)]
pub struct DataClient {
    http: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

impl DataClient {
    /// `base_url` is the REST root, e.g. `https://xyz.supabase.co/rest/v1`.
    /// Server-side writes authenticate with `service_key` when one is set.
    pub fn new(base_url: &str, api_key: &str, service_key: Option<&str>) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("skyway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bearer: service_key.unwrap_or(api_key).to_string(),
        })
    }

    /// Starts a query against `table`.
    pub fn from(&self, table: &str) -> Query<'_> {
        Query {
            client: self,
            table: table.to_string(),
            params: Vec::new(),
        }
    }

    /// Calls a stored procedure: `POST /rpc/{function}`.
    pub async fn rpc<T: DeserializeOwned, B: Serialize + ?Sized>(&self, function: &str, args: &B) -> Result<T, StoreError> {
        let url = format!("{}/rpc/{}", self.base_url, function);
        debug!("Datastore RPC {}", function);
        let resp = self.send(self.request(Method::POST, &url).json(args)).await?;
        Ok(resp.json().await?)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(StoreError::Status {
            service: SERVICE.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

/// One table request under construction.
pub struct Query<'a> {
    client: &'a DataClient,
    table: String,
    params: Vec<(String, String)>,
}

impl<'a> Query<'a> {
    pub fn select(self, columns: &str) -> Self {
        self.param("select", columns)
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lt", value)
    }

    /// Case-insensitive LIKE; `*` is the wildcard.
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "ilike", pattern)
    }

    pub fn in_list<V: Display>(self, column: &str, values: &[V]) -> Self {
        let joined = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",");
        self.param(column, format!("in.({})", joined))
    }

    /// Raw `or=(...)` group, e.g. `pnr.ilike.*abc*,contact_email.ilike.*abc*`.
    pub fn or(self, expression: &str) -> Self {
        self.param("or", format!("({})", expression))
    }

    pub fn order(self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.param("order", format!("{}.{}", column, direction))
    }

    pub fn limit(self, n: usize) -> Self {
        self.param("limit", n.to_string())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn url(&self) -> String {
        format!("{}/{}", self.client.base_url, self.table)
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, StoreError> {
        debug!("Datastore GET {} {:?}", self.table, self.params);
        let request = self.client.request(Method::GET, &self.url()).query(&self.params);
        let resp = self.client.send(request).await?;
        Ok(resp.json().await?)
    }

    pub async fn fetch_optional<T: DeserializeOwned>(self) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    /// Inserts one row and returns it as stored.
    pub async fn insert<T: DeserializeOwned, B: Serialize>(self, row: &B) -> Result<T, StoreError> {
        let table = self.table.clone();
        let rows: Vec<T> = self.write(Method::POST, row).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(SERVICE.to_string(), format!("insert into {} returned no row", table)))
    }

    pub async fn insert_many<T: DeserializeOwned, B: Serialize>(self, rows: &[B]) -> Result<Vec<T>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.write(Method::POST, rows).await
    }

    /// Patches every row matching the filters and returns them.
    pub async fn update<T: DeserializeOwned, B: Serialize>(self, patch: &B) -> Result<Vec<T>, StoreError> {
        self.write(Method::PATCH, patch).await
    }

    /// Insert-or-replace on the primary key.
    pub async fn upsert<T: DeserializeOwned, B: Serialize>(self, row: &B) -> Result<T, StoreError> {
        let table = self.table.clone();
        let request = self
            .client
            .request(Method::POST, &self.url())
            .query(&self.params)
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(row);
        let resp = self.client.send(request).await?;
        let rows: Vec<T> = resp.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(SERVICE.to_string(), format!("upsert into {} returned no row", table)))
    }

    pub async fn delete(self) -> Result<(), StoreError> {
        debug!("Datastore DELETE {} {:?}", self.table, self.params);
        let request = self.client.request(Method::DELETE, &self.url()).query(&self.params);
        self.client.send(request).await?;
        Ok(())
    }

    async fn write<T: DeserializeOwned, B: Serialize + ?Sized>(self, method: Method, body: &B) -> Result<Vec<T>, StoreError> {
        debug!("Datastore {} {} {:?}", method, self.table, self.params);
        let request = self
            .client
            .request(method, &self.url())
            .query(&self.params)
            .header("Prefer", "return=representation")
            .json(body);
        let resp = self.client.send(request).await?;
        Ok(resp.json().await?)
    }

    fn filter(self, column: &str, op: &str, value: impl Display) -> Self {
        self.param(column, format!("{}.{}", op, value))
    }

    fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }
}
