//! Two-way mapping between the catalog location query string and the
//! search/genre/sort selections, and from those selections to a remote request.

use serde::{Serialize, Serializer};
use std::fmt;

const KEY_SEARCH: &str = "search";
const KEY_GENRE: &str = "genre";
const KEY_SORT: &str = "sort";
/// Value the genre selector uses for "All Genres".
const ALL_GENRES: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    TitleAsc,
    TitleDesc,
    RatingDesc,
    RatingAsc,
    YearDesc,
    YearAsc,
    PopularityDesc,
    PopularityAsc,
}

impl SortKey {
    pub const ALL: [SortKey; 8] = [
        SortKey::TitleAsc,
        SortKey::TitleDesc,
        SortKey::RatingDesc,
        SortKey::RatingAsc,
        SortKey::YearDesc,
        SortKey::YearAsc,
        SortKey::PopularityDesc,
        SortKey::PopularityAsc,
    ];

    /// Value carried in the `sort` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            SortKey::TitleAsc => "title",
            SortKey::TitleDesc => "title_desc",
            SortKey::RatingDesc => "rating",
            SortKey::RatingAsc => "rating_asc",
            SortKey::YearDesc => "year",
            SortKey::YearAsc => "year_asc",
            SortKey::PopularityDesc => "popularity",
            SortKey::PopularityAsc => "popularity_asc",
        }
    }

    /// Exact, case-sensitive match against the parameter values.
    pub fn from_param(value: &str) -> Option<SortKey> {
        SortKey::ALL.into_iter().find(|k| k.as_param() == value)
    }

    pub fn field_and_direction(self) -> (SortField, SortDirection) {
        use SortDirection::{Ascending, Descending};
        match self {
            SortKey::TitleAsc => (SortField::Title, Ascending),
            SortKey::TitleDesc => (SortField::Title, Descending),
            SortKey::RatingDesc => (SortField::Rating, Descending),
            SortKey::RatingAsc => (SortField::Rating, Ascending),
            SortKey::YearDesc => (SortField::ReleaseDate, Descending),
            SortKey::YearAsc => (SortField::ReleaseDate, Ascending),
            SortKey::PopularityDesc => (SortField::Popularity, Descending),
            SortKey::PopularityAsc => (SortField::Popularity, Ascending),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortKey::TitleAsc => "Title (A-Z)",
            SortKey::TitleDesc => "Title (Z-A)",
            SortKey::RatingDesc => "Rating (High to Low)",
            SortKey::RatingAsc => "Rating (Low to High)",
            SortKey::YearDesc => "Year (Newest)",
            SortKey::YearAsc => "Year (Oldest)",
            SortKey::PopularityDesc => "Popularity (High to Low)",
            SortKey::PopularityAsc => "Popularity (Low to High)",
        }
    }
}

impl Serialize for SortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_param())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Rating,
    ReleaseDate,
    Popularity,
}

impl SortField {
    /// Column name in the remote movies table.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Rating => "rating",
            SortField::ReleaseDate => "release_date",
            SortField::Popularity => "popularity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Current catalog selections. `None` on an axis means no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryState {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub sort: Option<SortKey>,
}

impl QueryState {
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn genre_filter(&self) -> Option<&str> {
        self.genre
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case(ALL_GENRES))
    }
}

/// Read `search`, `genre` and `sort` from a location query string.
///
/// Never fails: undecodable pairs and unknown keys are skipped, and an
/// unrecognised sort value leaves the default ordering in place.
pub fn parse(location_query: &str) -> QueryState {
    let mut state = QueryState::default();
    let (mut seen_search, mut seen_genre, mut seen_sort) = (false, false, false);
    let query = location_query.strip_prefix('?').unwrap_or(location_query);

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let (Some(key), Some(value)) = (decode_component(raw_key), decode_component(raw_value))
        else {
            continue;
        };
        let value = value.trim();
        match key.as_str() {
            KEY_SEARCH if !seen_search => {
                seen_search = true;
                state.search = Some(value.to_string()).filter(|s| !s.is_empty());
            }
            KEY_GENRE if !seen_genre => {
                seen_genre = true;
                state.genre = Some(value.to_string())
                    .filter(|g| !g.is_empty() && !g.eq_ignore_ascii_case(ALL_GENRES));
            }
            KEY_SORT if !seen_sort => {
                seen_sort = true;
                state.sort = SortKey::from_param(value);
            }
            _ => {}
        }
    }
    state
}

/// Build the location query string for `state`. The unconstrained state yields `""`.
pub fn serialize(state: &QueryState) -> String {
    let mut pairs: Vec<String> = Vec::with_capacity(3);
    if let Some(search) = state.search_term() {
        pairs.push(format!("{KEY_SEARCH}={}", urlencoding::encode(search)));
    }
    if let Some(genre) = state.genre_filter() {
        pairs.push(format!("{KEY_GENRE}={}", urlencoding::encode(genre)));
    }
    if let Some(sort) = state.sort {
        pairs.push(format!("{KEY_SORT}={}", sort.as_param()));
    }
    pairs.join("&")
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

/// What to ask the remote store for.
///
/// Search and browse are separate modes: a search term overrides any genre
/// or sort selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RemoteRequest {
    Search {
        term: String,
    },
    Browse {
        genre: Option<String>,
        sort_field: SortField,
        sort_direction: SortDirection,
    },
}

impl RemoteRequest {
    pub fn browse_sorted(sort: SortKey) -> Self {
        let (sort_field, sort_direction) = sort.field_and_direction();
        RemoteRequest::Browse {
            genre: None,
            sort_field,
            sort_direction,
        }
    }
}

pub fn to_remote_request(state: &QueryState) -> RemoteRequest {
    if let Some(term) = state.search_term() {
        return RemoteRequest::Search {
            term: term.to_string(),
        };
    }
    let (sort_field, sort_direction) = state
        .sort
        .unwrap_or(SortKey::TitleAsc)
        .field_and_direction();
    RemoteRequest::Browse {
        genre: state.genre_filter().map(str::to_string),
        sort_field,
        sort_direction,
    }
}

impl fmt::Display for RemoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteRequest::Search { term } => write!(f, "search '{}'", term),
            RemoteRequest::Browse {
                genre,
                sort_field,
                sort_direction,
            } => write!(
                f,
                "browse genre={} order={}.{:?}",
                genre.as_deref().unwrap_or("*"),
                sort_field.column(),
                sort_direction
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(search: Option<&str>, genre: Option<&str>, sort: Option<SortKey>) -> QueryState {
        QueryState {
            search: search.map(str::to_string),
            genre: genre.map(str::to_string),
            sort,
        }
    }

    #[test]
    fn unconstrained_state_serializes_to_empty() {
        assert_eq!(serialize(&QueryState::default()), "");
        assert_eq!(serialize(&q(Some("   "), Some("all"), None)), "");
    }

    #[test]
    fn parses_all_three_keys() {
        let state = parse("?search=the%20batman&genre=Sci-Fi&sort=rating_asc");
        assert_eq!(state, q(Some("the batman"), Some("Sci-Fi"), Some(SortKey::RatingAsc)));
    }

    #[test]
    fn plus_decodes_to_space() {
        assert_eq!(parse("search=past+lives").search.as_deref(), Some("past lives"));
    }

    #[test]
    fn unknown_sort_falls_back_to_default() {
        let state = parse("sort=imdb");
        assert_eq!(state.sort, None);
        assert_eq!(
            to_remote_request(&state),
            RemoteRequest::Browse {
                genre: None,
                sort_field: SortField::Title,
                sort_direction: SortDirection::Ascending,
            }
        );
    }

    #[test]
    fn sort_match_is_case_sensitive() {
        assert_eq!(parse("sort=Rating").sort, None);
        assert_eq!(parse("sort=rating").sort, Some(SortKey::RatingDesc));
    }

    #[test]
    fn first_occurrence_wins_and_unknown_keys_ignored() {
        let state = parse("page=2&genre=Drama&genre=Comedy&sort=year&sort=title");
        assert_eq!(state, q(None, Some("Drama"), Some(SortKey::YearDesc)));
    }

    #[test]
    fn all_genres_sentinel_is_no_constraint() {
        assert_eq!(parse("genre=all").genre, None);
        assert_eq!(parse("genre=All").genre, None);
    }

    #[test]
    fn rating_asc_maps_to_rating_ascending() {
        let req = to_remote_request(&q(None, None, Some(SortKey::RatingAsc)));
        assert_eq!(
            req,
            RemoteRequest::Browse {
                genre: None,
                sort_field: SortField::Rating,
                sort_direction: SortDirection::Ascending,
            }
        );
    }

    #[test]
    fn search_overrides_genre_and_sort() {
        let req = to_remote_request(&q(Some("dune"), Some("Sci-Fi"), Some(SortKey::YearAsc)));
        assert_eq!(
            req,
            RemoteRequest::Search {
                term: "dune".to_string()
            }
        );
    }

    #[test]
    fn round_trip_preserves_remote_request() {
        let mut reachable = vec![
            QueryState::default(),
            q(Some("dune"), None, None),
            q(Some("everything everywhere"), None, None),
            q(None, Some("Sci-Fi"), None),
            q(None, Some("Science Fiction & Fantasy"), None),
            q(None, None, Some(SortKey::PopularityAsc)),
            q(None, Some("Drama"), Some(SortKey::YearDesc)),
            q(Some("a&b=c"), Some("Crime"), Some(SortKey::TitleDesc)),
        ];
        reachable.extend(SortKey::ALL.map(|k| q(None, Some("Comedy"), Some(k))));
        for state in &reachable {
            let restored = parse(&serialize(state));
            assert_eq!(
                to_remote_request(&restored),
                to_remote_request(state),
                "round trip changed request for {:?}",
                state
            );
        }
    }

    #[test]
    fn serialize_orders_keys_and_encodes_values() {
        let s = serialize(&q(Some("a b"), Some("Sci-Fi"), Some(SortKey::YearAsc)));
        assert_eq!(s, "search=a%20b&genre=Sci-Fi&sort=year_asc");
    }

    #[test]
    fn sort_params_round_trip_through_enum() {
        for key in SortKey::ALL {
            assert_eq!(SortKey::from_param(key.as_param()), Some(key));
        }
    }
}
