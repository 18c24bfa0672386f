use crate::favorites::FavoritesStore;
use crate::models::{Movie, MovieId};
use crate::query::{self, QueryState, RemoteRequest, SortKey};
use crate::store::{MovieStore, SupabaseClient};
use crate::view::{ListState, SharedCatalogView, EMPTY_MESSAGE};
use anyhow::Result;
use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::{env, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_PORT: u16 = 3146;
const HOME_SECTION_SIZE: usize = 5;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MovieStore>,
    pub favorites: Arc<FavoritesStore>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid movie ID")]
    InvalidId,
    #[error("Movie not found")]
    NotFound,
    #[error("{0}")]
    Remote(&'static str),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidId => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Remote(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(json!({"status": "error", "message": self.to_string()})),
        )
            .into_response()
    }
}

/// A movie plus whether it is currently a favorite.
#[derive(Debug, Serialize)]
pub struct MovieEntry {
    #[serde(flatten)]
    pub movie: Movie,
    pub is_favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct Controls {
    pub search: String,
    pub genre: Option<String>,
    pub sort: Option<&'static str>,
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CatalogPage {
    pub state: &'static str,
    pub controls: Controls,
    pub request: RemoteRequest,
    pub movies: Vec<MovieEntry>,
    pub message: Option<String>,
    pub genres: Vec<String>,
    pub sort_options: Vec<SortOption>,
}

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub top_rated: Vec<MovieEntry>,
    pub most_popular: Vec<MovieEntry>,
    pub newest: Vec<MovieEntry>,
}

#[derive(Debug, Serialize)]
pub struct FavoriteStatus {
    pub id: MovieId,
    pub favorite: bool,
}

pub async fn run_server() -> Result<()> {
    let store: Arc<dyn MovieStore> = Arc::new(SupabaseClient::from_env()?);
    let favorites = Arc::new(FavoritesStore::from_env());
    info!("Tracking {} favorites", favorites.get_all().len());

    let state = AppState { store, favorites };
    let app = build_router(state);

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/home", get(home))
        .route("/api/movies", get(catalog))
        .route("/api/movies/:id", get(movie_detail))
        .route("/api/genres", get(genres))
        .route("/api/favorites", get(favorite_movies))
        .route(
            "/api/favorites/:id",
            axum::routing::put(add_favorite).delete(remove_favorite),
        )
        .route("/api/favorites/:id/toggle", post(toggle_favorite))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn home(State(state): State<AppState>) -> Result<Json<HomePage>, ApiError> {
    let store = state.store.as_ref();
    let (top_rated, most_popular, newest) = tokio::join!(
        home_section(store, "top rated", SortKey::RatingDesc),
        home_section(store, "most popular", SortKey::PopularityDesc),
        home_section(store, "newest", SortKey::YearDesc),
    );
    let favorites = on_favorites(&state.favorites, |f| f.get_all()).await?;
    Ok(Json(HomePage {
        top_rated: with_favorites(top_rated, &favorites),
        most_popular: with_favorites(most_popular, &favorites),
        newest: with_favorites(newest, &favorites),
    }))
}

async fn home_section(store: &dyn MovieStore, name: &str, sort: SortKey) -> Vec<Movie> {
    match store
        .fetch_list(&RemoteRequest::browse_sorted(sort), Some(HOME_SECTION_SIZE))
        .await
    {
        Ok(movies) => movies,
        Err(e) => {
            warn!("Failed to load {} section: {:#}", name, e);
            Vec::new()
        }
    }
}

async fn catalog(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let parsed = query::parse(raw.as_deref().unwrap_or_default());
    let view = SharedCatalogView::new();
    let (_, genres) = tokio::join!(
        view.refresh(state.store.as_ref(), parsed),
        load_genres(state.store.as_ref()),
    );
    let (current, list) = view.snapshot().await;
    let favorites = on_favorites(&state.favorites, |f| f.get_all()).await?;
    let page = catalog_page(&current, list, genres, &favorites);
    let status = if page.state == "failed" {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(page)).into_response())
}

fn catalog_page(
    current: &QueryState,
    list: ListState,
    genres: Vec<String>,
    favorites: &[MovieId],
) -> CatalogPage {
    let state = list.name();
    let (movies, message) = match list {
        ListState::Populated { movies } => (movies, None),
        ListState::Empty => (Vec::new(), Some(EMPTY_MESSAGE.to_string())),
        ListState::Failed { message } => (Vec::new(), Some(message)),
        ListState::Idle | ListState::Loading => (Vec::new(), None),
    };
    CatalogPage {
        state,
        controls: Controls {
            search: current.search_term().unwrap_or_default().to_string(),
            genre: current.genre_filter().map(str::to_string),
            sort: current.sort.map(SortKey::as_param),
            location: query::serialize(current),
        },
        request: query::to_remote_request(current),
        movies: with_favorites(movies, favorites),
        message,
        genres,
        sort_options: SortKey::ALL
            .iter()
            .map(|k| SortOption {
                value: k.as_param(),
                label: k.label(),
            })
            .collect(),
    }
}

async fn load_genres(store: &dyn MovieStore) -> Vec<String> {
    store.fetch_genres().await.unwrap_or_else(|e| {
        warn!("Failed to load genres: {:#}", e);
        Vec::new()
    })
}

async fn genres(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    state.store.fetch_genres().await.map(Json).map_err(|e| {
        error!("Failed to load genres: {:#}", e);
        ApiError::Remote("Failed to load genres")
    })
}

async fn movie_detail(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<MovieEntry>, ApiError> {
    let id = parse_movie_id(&raw_id)?;
    let movie = match state.store.fetch_by_id(id).await {
        Ok(Some(movie)) => movie,
        Ok(None) => return Err(ApiError::NotFound),
        Err(e) => {
            error!("Failed to load movie {}: {:#}", id, e);
            return Err(ApiError::Remote("Failed to load movie details"));
        }
    };
    let id = movie.id;
    let is_favorite = on_favorites(&state.favorites, move |f| f.contains(id)).await?;
    Ok(Json(MovieEntry { movie, is_favorite }))
}

async fn favorite_movies(State(state): State<AppState>) -> Result<Json<Vec<MovieEntry>>, ApiError> {
    let ids = on_favorites(&state.favorites, |f| f.get_all()).await?;
    if ids.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let movies = state.store.fetch_by_ids(&ids).await.map_err(|e| {
        error!("Failed to load favorite movies: {:#}", e);
        ApiError::Remote("Failed to load favorites")
    })?;
    Ok(Json(with_favorites(movies, &ids)))
}

async fn toggle_favorite(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    let id = parse_movie_id(&raw_id)?;
    let favorite = on_favorites(&state.favorites, move |f| f.toggle(id)).await?;
    info!("Movie {} favorite -> {}", id, favorite);
    Ok(Json(FavoriteStatus { id, favorite }))
}

async fn add_favorite(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    let id = parse_movie_id(&raw_id)?;
    let favorite = on_favorites(&state.favorites, move |f| f.add(id)).await?;
    Ok(Json(FavoriteStatus { id, favorite }))
}

async fn remove_favorite(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<FavoriteStatus>, ApiError> {
    let id = parse_movie_id(&raw_id)?;
    let favorite = on_favorites(&state.favorites, move |f| f.remove(id)).await?;
    Ok(Json(FavoriteStatus { id, favorite }))
}

/// Favorites calls do blocking file I/O under a lock, so they run on the
/// blocking pool instead of an async worker.
async fn on_favorites<T, F>(favorites: &Arc<FavoritesStore>, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&FavoritesStore) -> T + Send + 'static,
    T: Send + 'static,
{
    let favorites = Arc::clone(favorites);
    tokio::task::spawn_blocking(move || call(&favorites))
        .await
        .map_err(|e| {
            error!("Favorites task failed: {}", e);
            ApiError::Internal
        })
}

fn parse_movie_id(raw: &str) -> Result<MovieId, ApiError> {
    raw.trim().parse::<MovieId>().map_err(|_| {
        warn!("Rejecting non-numeric movie id {:?}", raw);
        ApiError::InvalidId
    })
}

fn with_favorites(movies: Vec<Movie>, favorites: &[MovieId]) -> Vec<MovieEntry> {
    movies
        .into_iter()
        .map(|movie| {
            let is_favorite = favorites.contains(&movie.id);
            MovieEntry { movie, is_favorite }
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
