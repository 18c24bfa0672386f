//! Catalog list view: the current selections plus the load state of the
//! result list.
//!
//! Every change of selections issues a new ticket and moves the view to
//! `Loading`. A completion is applied only if it carries the latest ticket,
//! so a slow response can never overwrite the result of a newer query.
//!
//! The HTTP catalog route builds one view per request from the request's
//! query string; the view is not kept between requests.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::models::Movie;
use crate::query::{self, QueryState, RemoteRequest};
use crate::store::MovieStore;

pub const EMPTY_MESSAGE: &str = "No movies found matching your criteria";
pub const FAILED_MESSAGE: &str = "Failed to load movies";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ListState {
    Idle,
    Loading,
    Populated { movies: Vec<Movie> },
    Empty,
    Failed { message: String },
}

impl ListState {
    pub fn name(&self) -> &'static str {
        match self {
            ListState::Idle => "idle",
            ListState::Loading => "loading",
            ListState::Populated { .. } => "populated",
            ListState::Empty => "empty",
            ListState::Failed { .. } => "failed",
        }
    }
}

/// Identifies one load. Only the most recently issued ticket may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
pub struct CatalogView {
    query: QueryState,
    state: ListState,
    issued: u64,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogView {
    pub fn new() -> Self {
        Self {
            query: QueryState::default(),
            state: ListState::Idle,
            issued: 0,
        }
    }

    pub fn query(&self) -> &QueryState {
        &self.query
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    /// Replace the selections and start a load for them.
    pub fn set_query(&mut self, query: QueryState) -> (Ticket, RemoteRequest) {
        self.issued += 1;
        let request = query::to_remote_request(&query);
        self.query = query;
        self.state = ListState::Loading;
        (Ticket(self.issued), request)
    }

    /// Apply the outcome of a load. Returns `false` if the ticket is stale and
    /// the outcome was dropped.
    pub fn complete(&mut self, ticket: Ticket, outcome: Result<Vec<Movie>>) -> bool {
        if ticket.0 != self.issued {
            debug!(
                "Dropping stale catalog response (ticket {}, latest {})",
                ticket.0, self.issued
            );
            return false;
        }
        self.state = match outcome {
            Ok(movies) if movies.is_empty() => ListState::Empty,
            Ok(movies) => ListState::Populated { movies },
            Err(e) => {
                error!("Catalog load failed: {:#}", e);
                ListState::Failed {
                    message: FAILED_MESSAGE.to_string(),
                }
            }
        };
        true
    }
}

/// A catalog view shared between the code that changes selections and the
/// tasks that load results.
#[derive(Debug, Clone, Default)]
pub struct SharedCatalogView {
    inner: Arc<Mutex<CatalogView>>,
}

impl SharedCatalogView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `query`, fetch its results and apply them unless a newer query was
    /// set in the meantime. Returns whether the results were applied.
    pub async fn refresh(&self, store: &dyn MovieStore, query: QueryState) -> bool {
        let (ticket, request) = self.inner.lock().await.set_query(query);
        let outcome = store.fetch_list(&request, None).await;
        self.inner.lock().await.complete(ticket, outcome)
    }

    pub async fn snapshot(&self) -> (QueryState, ListState) {
        let view = self.inner.lock().await;
        (view.query().clone(), view.state().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovieId;
    use crate::query::SortKey;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::time::Duration;

    fn movie(id: MovieId, title: &str) -> Movie {
        Movie {
            id,
            title: title.to_string(),
            poster: String::new(),
            backdrop: None,
            overview: String::new(),
            rating: 7.0,
            year: Some(2020),
            runtime_minutes: None,
            genres: vec!["Drama".to_string()],
            director: None,
            vote_count: 0,
            popularity: 1.0,
        }
    }

    fn populated_titles(state: &ListState) -> Vec<&str> {
        match state {
            ListState::Populated { movies } => movies.iter().map(|m| m.title.as_str()).collect(),
            other => panic!("expected populated, got {}", other.name()),
        }
    }

    #[test]
    fn starts_idle_and_enters_loading_on_new_query() {
        let mut view = CatalogView::new();
        assert_eq!(view.state(), &ListState::Idle);
        let (_, request) = view.set_query(query::parse("sort=rating_asc"));
        assert_eq!(view.state(), &ListState::Loading);
        assert_eq!(request, RemoteRequest::browse_sorted(SortKey::RatingAsc));
        assert_eq!(query::serialize(view.query()), "sort=rating_asc");
    }

    #[test]
    fn zero_rows_is_empty_not_failed() {
        let mut view = CatalogView::new();
        let (ticket, _) = view.set_query(query::parse("genre=Western"));
        assert!(view.complete(ticket, Ok(Vec::new())));
        assert_eq!(view.state(), &ListState::Empty);
    }

    #[test]
    fn rows_populate() {
        let mut view = CatalogView::new();
        let (ticket, _) = view.set_query(QueryState::default());
        view.complete(ticket, Ok(vec![movie(1, "Dune")]));
        assert_eq!(view.state().name(), "populated");
        assert_eq!(populated_titles(view.state()), vec!["Dune"]);
    }

    #[test]
    fn failure_keeps_search_text() {
        let mut view = CatalogView::new();
        let (ticket, _) = view.set_query(query::parse("search=oppenheimer&genre=Drama"));
        view.complete(ticket, Err(anyhow!("503 service unavailable")));
        assert_eq!(
            view.state(),
            &ListState::Failed {
                message: FAILED_MESSAGE.to_string()
            }
        );
        assert_eq!(view.query().search.as_deref(), Some("oppenheimer"));
        assert_eq!(
            query::serialize(view.query()),
            "search=oppenheimer&genre=Drama"
        );
    }

    #[test]
    fn stale_completion_is_dropped() {
        let mut view = CatalogView::new();
        let (first, _) = view.set_query(query::parse("search=dune"));
        let (second, _) = view.set_query(query::parse("search=barbie"));
        assert!(view.complete(second, Ok(vec![movie(2, "Barbie")])));
        assert!(!view.complete(first, Ok(vec![movie(3, "Dune")])));
        assert_eq!(populated_titles(view.state()), vec!["Barbie"]);
    }

    #[test]
    fn stale_failure_does_not_replace_newer_rows() {
        let mut view = CatalogView::new();
        let (first, _) = view.set_query(query::parse("genre=Drama"));
        let (second, _) = view.set_query(query::parse("genre=Comedy"));
        assert!(!view.complete(first, Err(anyhow!("timeout"))));
        assert_eq!(view.state(), &ListState::Loading);
        assert!(view.complete(second, Ok(vec![movie(4, "Airplane!")])));
        assert_eq!(populated_titles(view.state()), vec!["Airplane!"]);
    }

    /// Search for "slow" takes longer than anything else.
    struct SlowStore;

    #[async_trait]
    impl MovieStore for SlowStore {
        async fn fetch_list(
            &self,
            request: &RemoteRequest,
            _limit: Option<usize>,
        ) -> Result<Vec<Movie>> {
            match request {
                RemoteRequest::Search { term } if term == "slow" => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(vec![movie(1, "Slow")])
                }
                _ => Ok(vec![movie(2, "Fast")]),
            }
        }
        async fn fetch_by_id(&self, _id: MovieId) -> Result<Option<Movie>> {
            Ok(None)
        }
        async fn fetch_by_ids(&self, _ids: &[MovieId]) -> Result<Vec<Movie>> {
            Ok(Vec::new())
        }
        async fn fetch_genres(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn newer_refresh_wins_over_slower_older_one() {
        let view = SharedCatalogView::new();
        let store = SlowStore;

        let slow = query::parse("search=slow");
        let fast = query::parse("search=fast");
        let (slow_applied, fast_applied) =
            tokio::join!(view.refresh(&store, slow), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                view.refresh(&store, fast).await
            });

        assert!(!slow_applied);
        assert!(fast_applied);
        let (query, state) = view.snapshot().await;
        assert_eq!(query.search.as_deref(), Some("fast"));
        assert_eq!(populated_titles(&state), vec!["Fast"]);
    }
}
