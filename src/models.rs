use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub type MovieId = i64;

const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w500";
const BACKDROP_BASE: &str = "https://image.tmdb.org/t/p/original";

/// A movie as the views see it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub poster: String,
    pub backdrop: Option<String>,
    pub overview: String,
    pub rating: f64,
    pub year: Option<i32>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub director: Option<String>,
    pub vote_count: u64,
    pub popularity: f64,
}

/// Raw row returned by the remote movies table.
#[derive(Debug, Clone, Deserialize)]
pub struct MovieRow {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub vote_count: Option<u64>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        let year = row.release_date.as_deref().and_then(extract_year);
        Movie {
            id: row.id,
            title: row.title,
            poster: row
                .poster_path
                .as_deref()
                .and_then(|p| image_url(POSTER_BASE, p))
                .unwrap_or_default(),
            backdrop: row
                .backdrop_path
                .as_deref()
                .and_then(|p| image_url(BACKDROP_BASE, p)),
            overview: row.overview.unwrap_or_default(),
            rating: row.rating.unwrap_or(0.0),
            year,
            runtime_minutes: row.runtime.filter(|r| *r > 0),
            genres: row.genres.unwrap_or_default(),
            director: row.director.filter(|d| !d.trim().is_empty()),
            vote_count: row.vote_count.unwrap_or(0),
            popularity: row.popularity.unwrap_or(0.0),
        }
    }
}

/// Year of a `YYYY-MM-DD` date. Falls back to a bare leading year for partial dates.
pub fn extract_year(date: &str) -> Option<i32> {
    let date = date.trim();
    if let Ok(d) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(d.year());
    }
    let head = date.split('-').next()?;
    if head.len() == 4 {
        head.parse().ok()
    } else {
        None
    }
}

fn image_url(base: &str, path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        None
    } else if path.starts_with("http://") || path.starts_with("https://") {
        Some(path.to_string())
    } else if path.starts_with('/') {
        Some(format!("{base}{path}"))
    } else {
        Some(format!("{base}/{path}"))
    }
}
