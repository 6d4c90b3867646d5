//! TMDB-backed classifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{MediaClassifier, MediaInfo};
use crate::error::Result;

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TvResult {
    id: u64,
    name: Option<String>,
    first_air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TvDetails {
    name: Option<String>,
    number_of_seasons: Option<u32>,
    number_of_episodes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MovieResult {
    title: Option<String>,
    release_date: Option<String>,
}

/// Year part of a `YYYY-MM-DD` date.
fn year_of(date: Option<&str>) -> Option<String> {
    date.and_then(|d| d.get(..4))
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

fn or_unknown(name: Option<String>) -> String {
    name.filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn movie_info(result: MovieResult) -> MediaInfo {
    MediaInfo::Movie {
        year: year_of(result.release_date.as_deref()),
        name: or_unknown(result.title),
    }
}

fn series_info(result: TvResult, details: Option<TvDetails>) -> MediaInfo {
    let year = year_of(result.first_air_date.as_deref());
    match details {
        Some(details) => MediaInfo::Series {
            name: or_unknown(details.name.or(result.name)),
            year,
            seasons: details.number_of_seasons,
            episodes: details.number_of_episodes,
        },
        None => MediaInfo::Series {
            name: or_unknown(result.name),
            year,
            seasons: None,
            episodes: None,
        },
    }
}

/// Looks titles up in The Movie Database using a bearer read token.
#[derive(Debug, Clone)]
pub struct TmdbClassifier {
    http: reqwest::Client,
    token: String,
    language: String,
    base_url: String,
}

impl TmdbClassifier {
    /// Creates a classifier with a 10 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: impl Into<String>, language: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            token: token.into(),
            language: language.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the classifier at another API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .query(&[("language", self.language.as_str())])
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MediaClassifier for TmdbClassifier {
    async fn search_series(&self, title: &str, year: Option<&str>) -> Result<Option<MediaInfo>> {
        let mut query = vec![("query", title)];
        if let Some(year) = year {
            query.push(("first_air_date_year", year));
        }
        let response: SearchResponse<TvResult> = self.get("/search/tv", &query).await?;
        let Some(result) = response.results.into_iter().next() else {
            return Ok(None);
        };

        let details = match self.get::<TvDetails>(&format!("/tv/{}", result.id), &[]).await {
            Ok(details) => Some(details),
            Err(e) => {
                log::warn!("Could not load details for series {}: {e}", result.id);
                None
            }
        };
        let info = series_info(result, details);
        log::debug!("Series match: {info:?}");
        Ok(Some(info))
    }

    async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Option<MediaInfo>> {
        let mut query = vec![("query", title)];
        if let Some(year) = year {
            query.push(("year", year));
        }
        let response: SearchResponse<MovieResult> = self.get("/search/movie", &query).await?;
        let info = response.results.into_iter().next().map(movie_info);
        log::debug!("Movie match: {info:?}");
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_of_dates() {
        assert_eq!(year_of(Some("2008-01-20")).as_deref(), Some("2008"));
        assert_eq!(year_of(Some("")), None);
        assert_eq!(year_of(Some("n/a")), None);
        assert_eq!(year_of(None), None);
    }

    #[test]
    fn movie_search_response() {
        let response: SearchResponse<MovieResult> = serde_json::from_str(
            r#"{"page":1,"results":[{"id":438631,"title":"Dune","release_date":"2021-09-15"},
                {"id":841,"title":"Der Wüstenplanet","release_date":"1984-12-14"}]}"#,
        )
        .unwrap();
        let info = response.results.into_iter().next().map(movie_info).unwrap();
        assert_eq!(info, MediaInfo::Movie {
            name: "Dune".to_string(),
            year: Some("2021".to_string()),
        });
    }

    #[test]
    fn empty_search_response() {
        let response: SearchResponse<TvResult> = serde_json::from_str(r#"{"page":1}"#).unwrap();
        assert!(response.results.is_empty());
    }

    #[test]
    fn series_with_details() {
        let result: TvResult =
            serde_json::from_str(r#"{"id":1396,"name":"Breaking Bad","first_air_date":"2008-01-20"}"#).unwrap();
        let details: TvDetails =
            serde_json::from_str(r#"{"name":"Breaking Bad","number_of_seasons":5,"number_of_episodes":62}"#)
                .unwrap();
        let info = series_info(result, Some(details));
        assert_eq!(info.seasons(), Some(5));
        assert_eq!(info.episodes(), Some(62));
        assert_eq!(info.year(), Some("2008"));
    }

    #[test]
    fn series_without_details_keeps_search_name() {
        let result: TvResult = serde_json::from_str(r#"{"id":7,"name":null}"#).unwrap();
        let info = series_info(result, None);
        assert_eq!(info.name(), Some("Unknown"));
        assert_eq!(info.seasons(), None);
    }

    #[test]
    fn base_url_is_normalised() {
        let classifier = TmdbClassifier::new("token", "de")
            .unwrap()
            .with_base_url("http://localhost:9/");
        assert_eq!(classifier.base_url, "http://localhost:9");
    }
}
