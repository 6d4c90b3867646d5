//! Media classification of finished jobs.
//!
//! Release names are reduced to a searchable title, then looked up through a
//! [`MediaClassifier`]. The result decides where the job's files end up.

pub mod tmdb;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use tmdb::TmdbClassifier;

/// Classification of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MediaInfo {
    #[serde(rename = "movie")]
    Movie {
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<String>,
    },
    #[serde(rename = "tv")]
    Series {
        #[serde(default)]
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seasons: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        episodes: Option<u32>,
    },
    #[serde(rename = "unknown")]
    Unknown,
}

impl MediaInfo {
    /// Short type label used in status snapshots: `movie`, `tv` or `unknown`.
    #[must_use]
    pub const fn media_type(&self) -> &'static str {
        match self {
            Self::Movie { .. } => "movie",
            Self::Series { .. } => "tv",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Movie { name, .. } | Self::Series { name, .. } => Some(name),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub fn year(&self) -> Option<&str> {
        match self {
            Self::Movie { year, .. } | Self::Series { year, .. } => year.as_deref(),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub const fn seasons(&self) -> Option<u32> {
        match self {
            Self::Series { seasons, .. } => *seasons,
            _ => None,
        }
    }

    #[must_use]
    pub const fn episodes(&self) -> Option<u32> {
        match self {
            Self::Series { episodes, .. } => *episodes,
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Lookup service mapping a cleaned title to movie or series metadata.
///
/// `Ok(None)` means the service answered without a match.
#[async_trait]
pub trait MediaClassifier: Send + Sync {
    /// Whether lookups can be made at all.
    fn is_configured(&self) -> bool {
        true
    }

    async fn search_series(&self, title: &str, year: Option<&str>) -> Result<Option<MediaInfo>>;

    async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Option<MediaInfo>>;
}

/// Classifier used when no service is configured; never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClassifier;

#[async_trait]
impl MediaClassifier for NoClassifier {
    fn is_configured(&self) -> bool {
        false
    }

    async fn search_series(&self, _title: &str, _year: Option<&str>) -> Result<Option<MediaInfo>> {
        Ok(None)
    }

    async fn search_movie(&self, _title: &str, _year: Option<&str>) -> Result<Option<MediaInfo>> {
        Ok(None)
    }
}

// ============================================================================
// Title cleaning
// ============================================================================

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("valid regex"));

static TV_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS\d{1,2}(E\d{1,2})?\b").expect("valid regex"));

static QUALITY_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(1080p|720p|2160p|4K|UHD|BluRay|BDRip|WEB-DL|WEBRip|WEB|HDTV|DVDRip|x264|x265|h264|h265|HEVC|AVC|AAC|DTS-HD|DTS|AC3|Atmos|ATVP|NF|AMZN|DSNP|HMAX|HULU|PCOK|PMTP|STAN|iP|DSCP|CR|DD5\.1|DD|TrueHD|FLAC|Opus|HDR10\+|HDR10|HDR|DV|SDR|REMUX|HYBRID|Retail|SUBBED|DUBBED|DiRFiX|COMPLETE|READ\.NFO|FS|WS)\b",
    )
    .expect("valid regex")
});

static LANGUAGE_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(German|English|Deutsch|Multi|DL|ML)\b").expect("valid regex")
});

static RELEASE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-[A-Za-z0-9]+\s*$").expect("valid regex"));

static SCENE_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(REPACK|PROPER|INTERNAL|LIMITED|UNRATED|DC|EXTENDED|REMASTERED)\b")
        .expect("valid regex")
});

/// First plausible release year in `name`.
#[must_use]
pub fn detect_year(name: &str) -> Option<String> {
    YEAR.captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `name` carries a season or episode marker.
#[must_use]
pub fn has_tv_marker(name: &str) -> bool {
    TV_MARKER.is_match(name)
}

/// Reduces a release name to a title suitable for a search query.
///
/// Quality tags are removed before language tags so that `WEB-DL` goes away
/// as a whole instead of leaving a dangling `WEB-`.
#[must_use]
pub fn clean_title(name: &str) -> String {
    let spaced = name.replace(['.', '_'], " ");
    let stripped = [&*YEAR, &*TV_MARKER, &*QUALITY_TAGS, &*LANGUAGE_TAGS, &*RELEASE_GROUP, &*SCENE_TAGS]
        .iter()
        .fold(spaced, |text, re| re.replace_all(&text, "").into_owned());

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}

/// Search parameters derived from a release name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    pub year: Option<String>,
    pub tv_marker: bool,
}

impl SearchQuery {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self {
            title: clean_title(name),
            year: detect_year(name),
            tv_marker: has_tv_marker(name),
        }
    }
}

async fn series(classifier: &dyn MediaClassifier, title: &str, year: Option<&str>) -> Option<MediaInfo> {
    classifier
        .search_series(title, year)
        .await
        .unwrap_or_else(|e| {
            log::warn!("Series lookup for '{title}' failed: {e}");
            None
        })
}

async fn movie(classifier: &dyn MediaClassifier, title: &str, year: Option<&str>) -> Option<MediaInfo> {
    classifier
        .search_movie(title, year)
        .await
        .unwrap_or_else(|e| {
            log::warn!("Movie lookup for '{title}' failed: {e}");
            None
        })
}

/// Classifies a release name.
///
/// A season marker searches series first, a year searches movies first,
/// anything else tries series then movies. Lookup errors count as no match.
pub async fn classify(classifier: &dyn MediaClassifier, name: &str) -> MediaInfo {
    if !classifier.is_configured() {
        log::info!("No classification service configured, leaving {name} unsorted");
        return MediaInfo::Unknown;
    }

    let query = SearchQuery::from_name(name);
    if query.title.is_empty() {
        log::warn!("Nothing searchable left in {name}");
        return MediaInfo::Unknown;
    }
    match &query.year {
        Some(year) => log::info!("Looking up '{}' ({year})", query.title),
        None => log::info!("Looking up '{}'", query.title),
    }

    let title = query.title.as_str();
    let year = query.year.as_deref();
    let found = if query.tv_marker {
        match series(classifier, title, year).await {
            Some(info) => Some(info),
            None => movie(classifier, title, year).await,
        }
    } else if year.is_some() {
        match movie(classifier, title, year).await {
            Some(info) => Some(info),
            None => series(classifier, title, None).await,
        }
    } else {
        match series(classifier, title, None).await {
            Some(info) => Some(info),
            None => movie(classifier, title, None).await,
        }
    };

    match found {
        Some(info) => {
            log::info!("Classified {name} as {} '{}'", info.media_type(), info.name().unwrap_or_default());
            info
        }
        None => {
            log::warn!("No match for '{title}'");
            MediaInfo::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers from fixed results and records which searches ran.
    #[derive(Default)]
    struct StubClassifier {
        series: Option<MediaInfo>,
        movie: Option<MediaInfo>,
        fail_series: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaClassifier for StubClassifier {
        async fn search_series(&self, title: &str, year: Option<&str>) -> Result<Option<MediaInfo>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("series:{title}:{}", year.unwrap_or("-")));
            if self.fail_series {
                return Err(crate::Error::Classification("service down".to_string()));
            }
            Ok(self.series.clone())
        }

        async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Option<MediaInfo>> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("movie:{title}:{}", year.unwrap_or("-")));
            Ok(self.movie.clone())
        }
    }

    fn dune() -> MediaInfo {
        MediaInfo::Movie {
            name: "Dune".to_string(),
            year: Some("2021".to_string()),
        }
    }

    fn breaking_bad() -> MediaInfo {
        MediaInfo::Series {
            name: "Breaking Bad".to_string(),
            year: Some("2008".to_string()),
            seasons: Some(5),
            episodes: Some(62),
        }
    }

    // ========================================================================
    // Title cleaning
    // ========================================================================

    #[test]
    fn cleans_movie_release() {
        let query = SearchQuery::from_name("Dune.2021.1080p.BluRay.x264-GROUP");
        assert_eq!(query.title, "Dune");
        assert_eq!(query.year.as_deref(), Some("2021"));
        assert!(!query.tv_marker);
    }

    #[test]
    fn cleans_series_release() {
        let query = SearchQuery::from_name("Breaking.Bad.S01E01.German.WEB-DL");
        assert_eq!(query.title, "Breaking Bad");
        assert_eq!(query.year, None);
        assert!(query.tv_marker);
    }

    #[test]
    fn cleans_scene_tags_and_underscores() {
        assert_eq!(
            clean_title("The_Matrix_1999_REPACK_German_DL_2160p_UHD_BluRay_HEVC-XYZ"),
            "The Matrix"
        );
        assert_eq!(clean_title("Show.S02.COMPLETE.German.DL.720p.WEB.h264-ABC"), "Show");
    }

    #[test]
    fn tv_marker_variants() {
        assert!(has_tv_marker("show.s1e2.mkv"));
        assert!(has_tv_marker("Show S03"));
        assert!(!has_tv_marker("Seven.1995"));
        assert!(!has_tv_marker("S01E01x"));
    }

    #[test]
    fn year_detection() {
        assert_eq!(detect_year("Blade.Runner.1982.Final.Cut").as_deref(), Some("1982"));
        assert_eq!(detect_year("Movie.2160p"), None);
        assert_eq!(detect_year("Movie.1850"), None);
    }

    // ========================================================================
    // Search priority
    // ========================================================================

    #[tokio::test]
    async fn year_searches_movies_first() {
        let stub = StubClassifier {
            movie: Some(dune()),
            ..StubClassifier::default()
        };
        let info = classify(&stub, "Dune.2021.1080p.BluRay.x264-GROUP").await;
        assert_eq!(info, dune());
        assert_eq!(*stub.calls.lock().unwrap(), ["movie:Dune:2021"]);
    }

    #[tokio::test]
    async fn tv_marker_searches_series_first() {
        let stub = StubClassifier {
            series: Some(breaking_bad()),
            movie: Some(dune()),
            ..StubClassifier::default()
        };
        let info = classify(&stub, "Breaking.Bad.S01E01.German.WEB-DL").await;
        assert_eq!(info.media_type(), "tv");
        assert_eq!(*stub.calls.lock().unwrap(), ["series:Breaking Bad:-"]);
    }

    #[tokio::test]
    async fn falls_back_to_other_search() {
        let stub = StubClassifier {
            movie: Some(dune()),
            ..StubClassifier::default()
        };
        let info = classify(&stub, "Dune.German.1080p").await;
        assert_eq!(info, dune());
        assert_eq!(*stub.calls.lock().unwrap(), ["series:Dune:-", "movie:Dune:-"]);
    }

    #[tokio::test]
    async fn lookup_errors_count_as_no_match() {
        let stub = StubClassifier {
            fail_series: true,
            ..StubClassifier::default()
        };
        let info = classify(&stub, "Show.S01E01.720p").await;
        assert!(info.is_unknown());
        assert_eq!(stub.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_classifier_is_unknown() {
        assert_eq!(classify(&NoClassifier, "Dune.2021").await, MediaInfo::Unknown);
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[test]
    fn media_info_is_tagged() {
        let json = serde_json::to_value(breaking_bad()).unwrap();
        assert_eq!(json["type"], "tv");
        assert_eq!(json["seasons"], 5);

        let json = serde_json::to_value(MediaInfo::Unknown).unwrap();
        assert_eq!(json, serde_json::json!({"type": "unknown"}));

        let parsed: MediaInfo = serde_json::from_str(r#"{"type":"movie","name":"Dune"}"#).unwrap();
        assert_eq!(parsed.year(), None);
        assert_eq!(parsed.name(), Some("Dune"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cleaning_never_panics(name in "\\PC{0,80}") {
                let title = clean_title(&name);
                prop_assert!(!title.starts_with(' '));
                prop_assert!(!title.ends_with(' '));
            }

            #[test]
            fn cleaned_title_has_no_separators(name in "[A-Za-z0-9._ -]{0,60}") {
                let title = clean_title(&name);
                prop_assert!(!title.contains('.'));
                prop_assert!(!title.contains('_'));
                prop_assert!(!title.contains("  "));
            }
        }
    }
}
