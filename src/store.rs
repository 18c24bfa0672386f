use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::time::Duration;
use tracing::debug;

use crate::models::{Movie, MovieId, MovieRow};
use crate::query::{RemoteRequest, SortDirection};

const REST_PATH: &str = "rest/v1";
const DEFAULT_TABLE: &str = "movies";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Read access to the hosted movies table.
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// The one list query behind the catalog and the landing sections.
    async fn fetch_list(&self, request: &RemoteRequest, limit: Option<usize>) -> Result<Vec<Movie>>;
    async fn fetch_by_id(&self, id: MovieId) -> Result<Option<Movie>>;
    /// Rows for `ids`, in the order of `ids`. Unknown ids are skipped.
    async fn fetch_by_ids(&self, ids: &[MovieId]) -> Result<Vec<Movie>>;
    /// Distinct genre labels, sorted.
    async fn fetch_genres(&self) -> Result<Vec<String>>;
}

/// PostgREST client for a Supabase-hosted movies table.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url = env::var("SUPABASE_URL").context("SUPABASE_URL not set")?;
        let api_key = env::var("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY not set")?;
        let table = env::var("SUPABASE_TABLE")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TABLE.to_string());
        Self::new(&base_url, &api_key, &table)
    }

    fn table_url(&self, params: &[(&str, String)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/{REST_PATH}/{}?{}", self.base_url, self.table, query)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let res = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {} {}", url, status, text));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }

    async fn fetch_rows(&self, params: &[(&str, String)]) -> Result<Vec<Movie>> {
        let rows: Vec<MovieRow> = self.get_json(&self.table_url(params)).await?;
        Ok(rows.into_iter().map(Movie::from).collect())
    }
}

#[async_trait]
impl MovieStore for SupabaseClient {
    async fn fetch_list(&self, request: &RemoteRequest, limit: Option<usize>) -> Result<Vec<Movie>> {
        let params = list_params(request, limit);
        self.fetch_rows(&params)
            .await
            .with_context(|| format!("fetching movie list ({})", request))
    }

    async fn fetch_by_id(&self, id: MovieId) -> Result<Option<Movie>> {
        let params = [("select", "*".to_string()), ("id", format!("eq.{id}"))];
        let mut movies = self
            .fetch_rows(&params)
            .await
            .with_context(|| format!("fetching movie {id}"))?;
        Ok(if movies.is_empty() {
            None
        } else {
            Some(movies.swap_remove(0))
        })
    }

    async fn fetch_by_ids(&self, ids: &[MovieId]) -> Result<Vec<Movie>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let params = [("select", "*".to_string()), ("id", format!("in.({list})"))];
        let movies = self
            .fetch_rows(&params)
            .await
            .with_context(|| format!("fetching {} movies by id", ids.len()))?;
        Ok(order_by_ids(movies, ids))
    }

    async fn fetch_genres(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct GenreRow {
            genres: Option<Vec<String>>,
        }

        let url = self.table_url(&[("select", "genres".to_string())]);
        let rows: Vec<GenreRow> = self.get_json(&url).await.context("fetching genres")?;
        Ok(distinct_genres(rows.into_iter().filter_map(|r| r.genres)))
    }
}

/// PostgREST parameters for a list request.
pub fn list_params(request: &RemoteRequest, limit: Option<usize>) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_string())];
    match request {
        RemoteRequest::Search { term } => {
            params.push(("title", format!("ilike.*{}*", escape_like(term))));
            params.push(("order", "title.asc".to_string()));
        }
        RemoteRequest::Browse {
            genre,
            sort_field,
            sort_direction,
        } => {
            if let Some(genre) = genre {
                params.push(("genres", format!("cs.{{\"{}\"}}", escape_array_item(genre))));
            }
            let direction = match sort_direction {
                SortDirection::Ascending => "asc",
                SortDirection::Descending => "desc.nullslast",
            };
            params.push(("order", format!("{}.{}", sort_field.column(), direction)));
        }
    }
    if let Some(limit) = limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

// `*` and `%` match anything and are dropped; `_` and `\` are escaped so they match literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '*' | '%' => {}
            '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

fn escape_array_item(item: &str) -> String {
    item.replace('\\', "\\\\").replace('"', "\\\"")
}

fn order_by_ids(movies: Vec<Movie>, ids: &[MovieId]) -> Vec<Movie> {
    let mut by_id: HashMap<MovieId, Movie> = movies.into_iter().map(|m| (m.id, m)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

pub fn distinct_genres<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    lists
        .into_iter()
        .flatten()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
