use serde::Deserialize;

use crate::Result;

pub mod ranking;

/// Search endpoint of the YouTube Data API v3
const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// Videos endpoint of the YouTube Data API v3 (duration + title enrichment)
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Result cap applied to each query variant
pub const MAX_RESULTS: u32 = 10;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.11; rv:44.0) Gecko/20100101 Firefox/44.0";

/// A video returned by the search provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub video_id: String,
    pub title: String,
    pub duration_ms: i64,
}

impl Candidate {
    /// Public watch URL for this candidate
    pub fn source_url(&self) -> String {
        format!("https://youtu.be/{}", self.video_id)
    }
}

/// Client for the video search/metadata provider.
///
/// Without an API key every call returns an empty result set and issues no
/// network traffic. Transport and decode failures are absorbed per call so one
/// bad query variant never aborts the other.
pub struct SearchClient {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl SearchClient {
    pub fn new(api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self { http, api_key }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Search for up to `max_results` video ids matching `query`.
    pub async fn search(&self, query: &str, max_results: u32) -> Vec<String> {
        let Some(key) = self.api_key.as_deref() else {
            return Vec::new();
        };

        match self.try_search(query, max_results, key).await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!("video search for {:?} failed: {:#}", query, err);
                Vec::new()
            }
        }
    }

    /// Fetch duration + title details for a batch of video ids in a single call.
    pub async fn details(&self, ids: &[String]) -> Vec<Candidate> {
        let Some(key) = self.api_key.as_deref() else {
            return Vec::new();
        };
        if ids.is_empty() {
            return Vec::new();
        }

        match self.try_details(ids, key).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!("detail lookup for {} video(s) failed: {:#}", ids.len(), err);
                Vec::new()
            }
        }
    }

    /// Collect candidates for both query variants, concatenated in variant order:
    /// `"artist - title"` results first, then the `lyrics` variant.
    pub async fn candidates_for_song(&self, artist: &str, title: &str) -> Vec<Candidate> {
        let plain_ids = self.search(&format!("{} - {}", artist, title), MAX_RESULTS).await;
        let lyrics_ids = self
            .search(&format!("{} - {} lyrics", artist, title), MAX_RESULTS)
            .await;

        let mut merged = self.details(&plain_ids).await;
        merged.extend(self.details(&lyrics_ids).await);
        merged
    }

    async fn try_search(&self, query: &str, max_results: u32, key: &str) -> Result<Vec<String>> {
        let max_results = max_results.to_string();
        let body = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("maxResults", max_results.as_str()),
                ("type", "video"),
                ("key", key),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_search_ids(&body)
    }

    async fn try_details(&self, ids: &[String], key: &str) -> Result<Vec<Candidate>> {
        let ids = ids.join(",");
        let body = self
            .http
            .get(VIDEOS_URL)
            .query(&[
                ("part", "contentDetails,snippet"),
                ("id", ids.as_str()),
                ("key", key),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_video_details(&body)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    #[serde(rename = "contentDetails")]
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

fn parse_search_ids(body: &str) -> Result<Vec<String>> {
    let response: SearchResponse = serde_json::from_str(body)?;

    Ok(response
        .items
        .into_iter()
        .filter_map(|item| item.id.video_id)
        .collect())
}

/// Items whose ISO-8601 duration does not parse (e.g. live streams reporting
/// `P0D`-less placeholders) are dropped from the result set.
fn parse_video_details(body: &str) -> Result<Vec<Candidate>> {
    let response: VideosResponse = serde_json::from_str(body)?;

    Ok(response
        .items
        .into_iter()
        .filter_map(|item| {
            let duration_ms = parse_iso8601_duration_ms(&item.content_details.duration)?;
            Some(Candidate {
                video_id: item.id,
                title: item.snippet.title,
                duration_ms,
            })
        })
        .collect())
}

/// Parse an ISO-8601 duration of the shape the videos endpoint emits
/// (`PT3M20S`, `PT1H2M`, `P1DT4S`, ...) into milliseconds.
///
/// Calendar components (years, months) never occur for videos and are rejected.
fn parse_iso8601_duration_ms(value: &str) -> Option<i64> {
    let rest = value.strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    let mut total_ms: i64 = 0;
    let mut digits = String::new();

    for ch in date_part.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            let n: i64 = digits.parse().ok()?;
            digits.clear();
            match ch {
                'W' => total_ms += n * 7 * 86_400_000,
                'D' => total_ms += n * 86_400_000,
                _ => return None,
            }
        }
    }
    if !digits.is_empty() {
        return None;
    }

    for ch in time_part.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else {
            let n: i64 = digits.parse().ok()?;
            digits.clear();
            match ch {
                'H' => total_ms += n * 3_600_000,
                'M' => total_ms += n * 60_000,
                'S' => total_ms += n * 1_000,
                _ => return None,
            }
        }
    }
    if !digits.is_empty() {
        return None;
    }

    Some(total_ms)
}
