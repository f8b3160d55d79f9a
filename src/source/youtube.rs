use chrono::{DateTime, Utc};
use log::{debug, trace};

use crate::common::{ChannelId, Upload};
use crate::source::base::{ChannelMetadata, PlatformError, PlatformResult, VideoPlatform};

/// Most items the API hands out per page
const MAX_RESULTS: u32 = 50;

fn api_prefix() -> String {
    #[cfg(test)]
    let prefix: String = mockito::server_url();

    #[cfg(not(test))]
    let prefix: String = std::env::var("VIDRELAY_YOUTUBE_URL")
        .ok()
        .unwrap_or_else(|| "https://www.googleapis.com".into());

    prefix
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTResourceId {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTSubscriptionListResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<YTSubscription>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTSubscription {
    id: String,
    snippet: YTSubscriptionSnippet,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTSubscriptionSnippet {
    title: String,
    resource_id: YTResourceId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct YTChannelListResponse {
    kind: String,
    #[serde(default)]
    items: Vec<YTChannel>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTContentDetails {
    related_playlists: YTRelatedPlaylists,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTRelatedPlaylists {
    uploads: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTChannel {
    id: String,
    snippet: YTChannelSnippet,
    content_details: YTContentDetails,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct YTChannelSnippet {
    title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTPlaylistItemListResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<YTPlaylistItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct YTPlaylistItemSnippet {
    published_at: String,
    title: String,
    #[serde(default)]
    channel_title: String,
    resource_id: YTResourceId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct YTPlaylistItem {
    id: String,
    snippet: YTPlaylistItemSnippet,
}

/// Body of a non-2xx response from the Data API
#[derive(Serialize, Deserialize, Debug, Clone)]
struct YTErrorResponse {
    error: YTErrorBody,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct YTErrorBody {
    code: u16,
    message: String,
    #[serde(default)]
    errors: Vec<YTErrorDetail>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct YTErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Map a failed response onto the error taxonomy callers make retry decisions on
fn classify_failure(status: u16, body: &str) -> PlatformError {
    let parsed: Option<YTErrorResponse> = serde_json::from_str(body).ok();
    let (message, quota) = match parsed {
        Some(e) => {
            let quota = e.error.errors.iter().any(|d| {
                d.reason == "quotaExceeded"
                    || d.reason == "rateLimitExceeded"
                    || d.reason == "userRateLimitExceeded"
            });
            (e.error.message, quota)
        }
        None => (body.to_string(), false),
    };

    match status {
        429 => PlatformError::Quota { status, message },
        403 if quota => PlatformError::Quota { status, message },
        401 | 403 => PlatformError::Auth { status, message },
        500..=599 => PlatformError::Server { status, message },
        _ => PlatformError::Api { status, message },
    }
}

/// Channel and playlist IDs are spliced into query strings, so only the
/// URL-safe alphabet Youtube uses for them is accepted
fn checked_id<'a>(kind: &'static str, value: &'a str) -> PlatformResult<&'a str> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(value)
    } else {
        Err(PlatformError::InvalidId {
            kind,
            value: value.into(),
        })
    }
}

/// Client for the Youtube Data API v3, authenticated as a single user
#[derive(Debug)]
pub struct YoutubeClient {
    prefix: String,
    access_token: String,
}

impl YoutubeClient {
    pub fn new(access_token: &str) -> YoutubeClient {
        YoutubeClient {
            prefix: api_prefix(),
            access_token: access_token.into(),
        }
    }

    fn request_data<T: serde::de::DeserializeOwned + std::fmt::Debug>(
        &self,
        url: &str,
    ) -> PlatformResult<T> {
        debug!("Retrieving URL {}", url);
        let transport = |source| PlatformError::Transport {
            url: url.into(),
            source,
        };
        let resp = attohttpc::get(url)
            .bearer_auth(&self.access_token)
            .send()
            .map_err(transport)?;
        let status = resp.status();
        let text = resp.text().map_err(transport)?;
        trace!("Raw response: {}", &text);

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        let d: T = serde_json::from_str(&text).map_err(|e| PlatformError::Malformed {
            url: url.into(),
            reason: e.to_string(),
        })?;
        trace!("Raw deserialisation: {:?}", &d);
        Ok(d)
    }
}

impl VideoPlatform for YoutubeClient {
    fn subscriptions(&self) -> PlatformResult<Vec<ChannelId>> {
        let url = format!(
            "{prefix}/youtube/v3/subscriptions?part=snippet&mine=true&maxResults={num}",
            prefix = self.prefix,
            num = MAX_RESULTS,
        );
        let d: YTSubscriptionListResponse = self.request_data(&url)?;
        if d.next_page_token.is_some() {
            debug!("More than {} subscriptions, only using first page", MAX_RESULTS);
        }

        let mut channels = vec![];
        for sub in d.items {
            match sub.snippet.resource_id.channel_id {
                Some(id) => channels.push(ChannelId::new(id)),
                None => {
                    return Err(PlatformError::Malformed {
                        url,
                        reason: format!("subscription {} has no channel ID", sub.id),
                    })
                }
            }
        }
        Ok(channels)
    }

    fn channel_metadata(&self, chan: &ChannelId) -> PlatformResult<ChannelMetadata> {
        let url = format!(
            "{prefix}/youtube/v3/channels?part=snippet%2CcontentDetails&id={chanid}",
            prefix = self.prefix,
            chanid = checked_id("channel", &chan.id)?,
        );
        let d: YTChannelListResponse = self.request_data(&url)?;

        let c = d
            .items
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::NotFound(chan.clone()))?;
        debug!(
            "Uploads playlist of {} ({}) is {}",
            c.id, c.snippet.title, c.content_details.related_playlists.uploads
        );

        Ok(ChannelMetadata {
            title: c.snippet.title,
            uploads_playlist: c.content_details.related_playlists.uploads,
        })
    }

    fn playlist_uploads(&self, playlist_id: &str) -> PlatformResult<Vec<Upload>> {
        let url = format!(
            "{prefix}/youtube/v3/playlistItems?part=snippet&maxResults={num}&playlistId={playlist}",
            prefix = self.prefix,
            num = MAX_RESULTS,
            playlist = checked_id("playlist", playlist_id)?,
        );
        let d: YTPlaylistItemListResponse = self.request_data(&url)?;

        let mut uploads = Vec::with_capacity(d.items.len());
        for YTPlaylistItem { id, snippet: s } in d.items {
            let published_at = s
                .published_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| PlatformError::Malformed {
                    url: url.clone(),
                    reason: format!("bad publishedAt {:?} on {}: {}", s.published_at, id, e),
                })?;
            let video_id = s.resource_id.video_id.ok_or_else(|| PlatformError::Malformed {
                url: url.clone(),
                reason: format!("playlist item {} has no video ID", id),
            })?;
            uploads.push(Upload {
                video_id,
                title: s.title,
                channel_title: s.channel_title,
                published_at,
            });
        }
        Ok(uploads)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    static SUBSCRIPTIONS: &str = r#"{
        "kind": "youtube#subscriptionListResponse",
        "pageInfo": {"totalResults": 2, "resultsPerPage": 50},
        "items": [
            {"kind": "youtube#subscription", "id": "sub1",
             "snippet": {"title": "Rooster Teeth",
                         "resourceId": {"kind": "youtube#channel", "channelId": "UCzH3iADRIq1IJlIXjfNgTpA"}}},
            {"kind": "youtube#subscription", "id": "sub2",
             "snippet": {"title": "Pentadact",
                         "resourceId": {"kind": "youtube#channel", "channelId": "UCd_lJ4zSp9wZDNyeKCWUstg"}}}
        ]
    }"#;

    static CHANNEL: &str = r#"{
        "kind": "youtube#channelListResponse",
        "items": [
            {"kind": "youtube#channel", "id": "UCzH3iADRIq1IJlIXjfNgTpA",
             "snippet": {"title": "Rooster Teeth", "description": "..."},
             "contentDetails": {"relatedPlaylists": {"likes": "", "uploads": "UUzH3iADRIq1IJlIXjfNgTpA"}}}
        ]
    }"#;

    static PLAYLIST: &str = r#"{
        "kind": "youtube#playlistItemListResponse",
        "nextPageToken": "CAUQAA",
        "items": [
            {"kind": "youtube#playlistItem", "id": "item1",
             "snippet": {"publishedAt": "2020-03-02T17:00:11Z",
                         "title": "CAN WE LEARN TO DRIVE STICK? | RT Life",
                         "channelTitle": "Rooster Teeth",
                         "playlistId": "UUzH3iADRIq1IJlIXjfNgTpA",
                         "resourceId": {"kind": "youtube#video", "videoId": "vid1"}}},
            {"kind": "youtube#playlistItem", "id": "item2",
             "snippet": {"publishedAt": "2020-03-02T15:00:02Z",
                         "title": "Pancake Podcast 2020 - Ep. #585  - RT Podcast",
                         "channelTitle": "Rooster Teeth",
                         "resourceId": {"kind": "youtube#video", "videoId": "vid2"}}}
        ]
    }"#;

    #[test]
    fn test_subscriptions() -> anyhow::Result<()> {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/subscriptions?part=snippet&mine=true&maxResults=50",
        )
        .match_header("authorization", "Bearer token-subs")
        .with_body(SUBSCRIPTIONS)
        .create();

        let yt = YoutubeClient::new("token-subs");
        let subs = yt.subscriptions()?;
        assert_eq!(
            subs,
            vec![
                ChannelId::new("UCzH3iADRIq1IJlIXjfNgTpA"),
                ChannelId::new("UCd_lJ4zSp9wZDNyeKCWUstg"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_metadata() -> anyhow::Result<()> {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/channels?part=snippet%2CcontentDetails&id=UCzH3iADRIq1IJlIXjfNgTpA",
        )
        .with_body(CHANNEL)
        .create();

        let yt = YoutubeClient::new("token");
        let meta = yt.channel_metadata(&ChannelId::new("UCzH3iADRIq1IJlIXjfNgTpA"))?;
        assert_eq!(meta.title, "Rooster Teeth");
        assert_eq!(meta.uploads_playlist, "UUzH3iADRIq1IJlIXjfNgTpA");
        Ok(())
    }

    #[test]
    fn test_missing_channel() {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/channels?part=snippet%2CcontentDetails&id=UCdoesnotexist",
        )
        .with_body(r#"{"kind": "youtube#channelListResponse", "pageInfo": {"totalResults": 0}}"#)
        .create();

        let yt = YoutubeClient::new("token");
        match yt.channel_metadata(&ChannelId::new("UCdoesnotexist")) {
            Err(PlatformError::NotFound(c)) => assert_eq!(c.id, "UCdoesnotexist"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unsafe_ids() {
        let yt = YoutubeClient::new("token");
        match yt.channel_metadata(&ChannelId::new("x&id=y")) {
            Err(PlatformError::InvalidId { kind, value }) => {
                assert_eq!(kind, "channel");
                assert_eq!(value, "x&id=y");
            }
            other => panic!("Expected InvalidId, got {:?}", other),
        }
        assert!(matches!(
            yt.playlist_uploads("UU&maxResults=1"),
            Err(PlatformError::InvalidId {
                kind: "playlist",
                ..
            })
        ));
        assert!(matches!(
            yt.channel_metadata(&ChannelId::new("")),
            Err(PlatformError::InvalidId { .. })
        ));

        assert_eq!(
            checked_id("channel", "UCd_lJ4zSp9wZDNyeKCWUstg").ok(),
            Some("UCd_lJ4zSp9wZDNyeKCWUstg")
        );
        assert!(checked_id("playlist", "UU-a b").is_err());
    }

    #[test]
    fn test_playlist_uploads() -> anyhow::Result<()> {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/playlistItems?part=snippet&maxResults=50&playlistId=UUzH3iADRIq1IJlIXjfNgTpA",
        )
        .with_body(PLAYLIST)
        .create();

        let yt = YoutubeClient::new("token");
        let uploads = yt.playlist_uploads("UUzH3iADRIq1IJlIXjfNgTpA")?;
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].video_id, "vid1");
        assert_eq!(uploads[0].title, "CAN WE LEARN TO DRIVE STICK? | RT Life");
        assert_eq!(uploads[0].channel_title, "Rooster Teeth");
        assert_eq!(
            uploads[1].published_at,
            Utc.with_ymd_and_hms(2020, 3, 2, 15, 0, 2).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_empty_playlist() -> anyhow::Result<()> {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/playlistItems?part=snippet&maxResults=50&playlistId=UUempty",
        )
        .with_body(r#"{"kind": "youtube#playlistItemListResponse", "items": []}"#)
        .create();

        let yt = YoutubeClient::new("token");
        assert!(yt.playlist_uploads("UUempty")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_bad_timestamp() {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/playlistItems?part=snippet&maxResults=50&playlistId=UUbaddate",
        )
        .with_body(
            r#"{"items": [{"id": "x", "snippet": {"publishedAt": "yesterday", "title": "t",
                "resourceId": {"kind": "youtube#video", "videoId": "v"}}}]}"#,
        )
        .create();

        let yt = YoutubeClient::new("token");
        match yt.playlist_uploads("UUbaddate") {
            Err(PlatformError::Malformed { reason, .. }) => assert!(reason.contains("yesterday")),
            other => panic!("Expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_quota_exceeded() {
        let _m = mockito::mock(
            "GET",
            "/youtube/v3/playlistItems?part=snippet&maxResults=50&playlistId=UUquota",
        )
        .with_status(403)
        .with_body(
            r#"{"error": {"code": 403, "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{"domain": "youtube.quota", "reason": "quotaExceeded"}]}}"#,
        )
        .create();

        let yt = YoutubeClient::new("token");
        let err = yt.playlist_uploads("UUquota").unwrap_err();
        assert!(matches!(err, PlatformError::Quota { status: 403, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(401, r#"{"error": {"code": 401, "message": "Invalid Credentials"}}"#),
            PlatformError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            classify_failure(403, r#"{"error": {"code": 403, "message": "forbidden", "errors": [{"reason": "forbidden"}]}}"#),
            PlatformError::Auth { status: 403, .. }
        ));
        assert!(matches!(
            classify_failure(503, "<html>backend error</html>"),
            PlatformError::Server { status: 503, .. }
        ));
        assert!(matches!(
            classify_failure(429, ""),
            PlatformError::Quota { status: 429, .. }
        ));
        assert!(matches!(
            classify_failure(400, "bad"),
            PlatformError::Api { status: 400, .. }
        ));
    }
}
