//! Run a catalog location query against the remote store and print the result as JSON.
//! Usage:
//!   cargo run --bin catalog_query -- "search=dune"
//!   cargo run --bin catalog_query -- "genre=Drama&sort=rating_asc"
//!   cargo run --bin catalog_query -- --id 42
//! Requires SUPABASE_URL and SUPABASE_ANON_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use movievibes::query;
use movievibes::store::{list_params, MovieStore, SupabaseClient};
use serde_json::json;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let client = SupabaseClient::from_env()?;

    if args.first().map(String::as_str) == Some("--id") {
        let id = args
            .get(1)
            .context("--id needs a movie id")?
            .parse()
            .context("movie id must be an integer")?;
        let movie = client.fetch_by_id(id).await?;
        println!("{}", serde_json::to_string_pretty(&movie)?);
        return Ok(());
    }

    let raw = args.first().map(String::as_str).unwrap_or_default();
    let state = query::parse(raw);
    let request = query::to_remote_request(&state);
    let params: Vec<String> = list_params(&request, None)
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    let movies = client.fetch_list(&request, None).await?;
    let out = json!({
        "query": state,
        "location": query::serialize(&state),
        "request": request,
        "params": params,
        "count": movies.len(),
        "movies": movies,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
