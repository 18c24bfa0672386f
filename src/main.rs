use anyhow::{bail, Result};
use dotenvy::dotenv;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,movievibes=info,tower_http=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Validate the configuration `lookup` resolves. Returns the remote host the
/// server will talk to.
fn check_config<F>(lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let Some(url) = present("SUPABASE_URL") else {
        bail!("Missing required environment variable: SUPABASE_URL");
    };
    let url = url.trim();
    let Some(host) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|rest| !rest.is_empty())
    else {
        bail!("SUPABASE_URL must be an http(s) URL, got {:?}", url);
    };
    if present("SUPABASE_ANON_KEY").is_none() {
        bail!("Missing required environment variable: SUPABASE_ANON_KEY");
    }
    if let Some(port) = present("PORT") {
        if port.trim().parse::<u16>().is_err() {
            bail!("PORT must be a number between 0 and 65535, got {:?}", port);
        }
    }
    Ok(host.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_result = dotenv();
    init_tracing();
    match dotenv_result {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
    let host = check_config(|key| env::var(key).ok())?;
    info!("Movie catalog backed by {}", host);
    movievibes::app::run_server().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn accepts_complete_config() {
        let host = check_config(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(host, "abc.supabase.co");
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = check_config(lookup(&[
            ("SUPABASE_URL", "http://localhost:54321"),
            ("SUPABASE_ANON_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SUPABASE_ANON_KEY"));

        let err = check_config(lookup(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
    }

    #[test]
    fn rejects_url_without_scheme() {
        for url in ["abc.supabase.co", "ftp://abc", "https://"] {
            let result = check_config(lookup(&[
                ("SUPABASE_URL", url),
                ("SUPABASE_ANON_KEY", "anon"),
            ]));
            assert!(result.is_err(), "accepted {:?}", url);
        }
    }

    #[test]
    fn rejects_non_numeric_port() {
        let err = check_config(lookup(&[
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
