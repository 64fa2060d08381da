//! Domain types for content batches and their posting lifecycle.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

/// The six supported social networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Twitter,
    LinkedIn,
    Instagram,
    TikTok,
    YouTube,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Instagram,
        Platform::TikTok,
        Platform::YouTube,
        Platform::Facebook,
    ];

    /// The only platform the scheduling agent posts to directly.
    pub const DIRECT_POST: Platform = Platform::Twitter;

    /// Display name, also used in persisted platform lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "Twitter",
            Platform::LinkedIn => "LinkedIn",
            Platform::Instagram => "Instagram",
            Platform::TikTok => "TikTok",
            Platform::YouTube => "YouTube",
            Platform::Facebook => "Facebook",
        }
    }

    /// Lowercase key used by agents for the scripts object.
    pub fn key(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::YouTube => "youtube",
            Platform::Facebook => "facebook",
        }
    }

    /// Agent tool that publishes directly, if the platform supports it.
    pub fn direct_post_tool(&self) -> Option<&'static str> {
        match self {
            Platform::Twitter => Some("TWITTER_CREATION_OF_A_POST"),
            _ => None,
        }
    }

    /// Case-insensitive match against display names (keys are their lowercase form).
    pub fn parse_platform(s: &str) -> Option<Platform> {
        let s = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::parse_platform(s).ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Platform selection; iteration follows `Platform::ALL` order.
pub type PlatformSet = BTreeSet<Platform>;

pub fn all_platforms() -> PlatformSet {
    Platform::ALL.into_iter().collect()
}

/// Comma-joined display names, e.g. `Twitter, LinkedIn`.
pub fn join_platforms(platforms: &PlatformSet) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Opaque batch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn generate() -> Self {
        BatchId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(value: &str) -> Self {
        BatchId(value.to_string())
    }
}

impl FromStr for BatchId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BatchId(s.trim().to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub character_count: usize,
}

impl Script {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            character_count: char_count(&content),
            content,
            ..Default::default()
        }
    }
}

pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

/// Per-platform scripts. Persisted as an object keyed by `Platform::key`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scripts(BTreeMap<Platform, Script>);

impl Scripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, platform: Platform) -> Option<&Script> {
        self.0.get(&platform)
    }

    pub fn insert(&mut self, platform: Platform, script: Script) -> Option<Script> {
        self.0.insert(platform, script)
    }

    /// Script content, empty when the platform has no script.
    pub fn content(&self, platform: Platform) -> &str {
        self.0.get(&platform).map(|s| s.content.as_str()).unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = (Platform, &Script)> {
        self.0.iter().map(|(p, s)| (*p, s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop scripts for platforms outside `platforms`.
    pub fn retain_platforms(&mut self, platforms: &PlatformSet) {
        self.0.retain(|p, _| platforms.contains(p));
    }

    /// Replace one platform's content, keeping hashtags and format. Returns
    /// whether anything changed.
    pub fn set_content(&mut self, platform: Platform, content: &str) -> bool {
        let script = self.0.entry(platform).or_default();
        if script.content == content {
            return false;
        }
        script.content = content.to_string();
        script.character_count = char_count(content);
        true
    }

    /// Platforms whose script has non-empty content.
    pub fn with_content(&self) -> PlatformSet {
        self.0
            .iter()
            .filter(|(_, s)| !s.content.trim().is_empty())
            .map(|(p, _)| *p)
            .collect()
    }
}

impl FromIterator<(Platform, Script)> for Scripts {
    fn from_iter<I: IntoIterator<Item = (Platform, Script)>>(iter: I) -> Self {
        Scripts(iter.into_iter().collect())
    }
}

impl Serialize for Scripts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (platform, script) in &self.0 {
            map.serialize_entry(platform.key(), script)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Scripts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| {
                let platform = Platform::parse_platform(&k)?;
                serde_json::from_value::<Script>(v).ok().map(|s| (platform, s))
            })
            .collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendItem {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default, deserialize_with = "known_platforms")]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub content_angles: Vec<String>,
}

/// Platform list that skips names and values it does not recognise.
fn known_platforms<'de, D, C>(deserializer: D) -> Result<C, D::Error>
where
    D: Deserializer<'de>,
    C: FromIterator<Platform>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .iter()
        .filter_map(serde_json::Value::as_str)
        .filter_map(Platform::parse_platform)
        .collect())
}

/// Research payload returned by the generation agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendInsights {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub trends: Vec<TrendItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PostingStatus {
    Posted,
    Ready,
    Failed,
    #[default]
    Unknown,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStatus::Posted => "posted",
            PostingStatus::Ready => "ready",
            PostingStatus::Failed => "failed",
            PostingStatus::Unknown => "unknown",
        }
    }

    /// Lenient mapping of agent-reported status text.
    pub fn from_agent(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "posted" => PostingStatus::Posted,
            "ready" => PostingStatus::Ready,
            "failed" => PostingStatus::Failed,
            _ => PostingStatus::Unknown,
        }
    }
}

impl Serialize for PostingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PostingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(PostingStatus::from_agent(&raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingOutcome {
    /// Platform name as reported by the agent.
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub status: PostingStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
}

impl PostingOutcome {
    pub fn platform(&self) -> Option<Platform> {
        Platform::parse_platform(&self.platform)
    }

    fn same_platform(&self, other: &PostingOutcome) -> bool {
        self.platform
            .trim()
            .eq_ignore_ascii_case(other.platform.trim())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Draft,
    Scheduled,
    Posted,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Draft => "draft",
            BatchStatus::Scheduled => "scheduled",
            BatchStatus::Posted => "posted",
        }
    }

    /// `None` means no posting attempt was made.
    pub fn derive(outcomes: Option<&[PostingOutcome]>) -> Self {
        match outcomes {
            None => BatchStatus::Draft,
            Some(rows) if rows.iter().any(|r| r.status == PostingStatus::Posted) => {
                BatchStatus::Posted
            }
            Some(_) => BatchStatus::Scheduled,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(BatchStatus::Draft),
            "scheduled" => Ok(BatchStatus::Scheduled),
            "posted" => Ok(BatchStatus::Posted),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// One generation run and everything that happened to it afterwards.
///
/// Identity fields (`id`, `created_at`, `topic`, `platforms`) are fixed at
/// creation. Status is never stored; it is derived from the posting outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "StoredBatch", from = "StoredBatch")]
pub struct ContentBatch {
    id: BatchId,
    created_at: DateTime<Utc>,
    topic: String,
    platforms: PlatformSet,
    trend_insights: Option<TrendInsights>,
    scripts: Scripts,
    posting_outcomes: Option<Vec<PostingOutcome>>,
    posting_summary: Option<String>,
}

impl ContentBatch {
    pub fn new(
        topic: &str,
        platforms: PlatformSet,
        trend_insights: Option<TrendInsights>,
        mut scripts: Scripts,
    ) -> Self {
        scripts.retain_platforms(&platforms);
        Self {
            id: BatchId::generate(),
            created_at: Utc::now(),
            topic: topic.trim().to_string(),
            platforms,
            trend_insights,
            scripts,
            posting_outcomes: None,
            posting_summary: None,
        }
    }

    /// Override the creation time; only meaningful before the batch is stored.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &BatchId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn platforms(&self) -> &PlatformSet {
        &self.platforms
    }

    pub fn trend_insights(&self) -> Option<&TrendInsights> {
        self.trend_insights.as_ref()
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }

    pub fn posting_outcomes(&self) -> Option<&[PostingOutcome]> {
        self.posting_outcomes.as_deref()
    }

    pub fn posting_summary(&self) -> Option<&str> {
        self.posting_summary.as_deref()
    }

    pub fn status(&self) -> BatchStatus {
        BatchStatus::derive(self.posting_outcomes())
    }

    /// Requested platforms whose script came back with content.
    pub fn eligible_platforms(&self) -> PlatformSet {
        self.scripts
            .with_content()
            .intersection(&self.platforms)
            .copied()
            .collect()
    }

    /// Returns false when the platform is not part of this batch or the
    /// content is unchanged.
    pub fn set_script_content(&mut self, platform: Platform, content: &str) -> bool {
        if !self.platforms.contains(&platform) {
            return false;
        }
        self.scripts.set_content(platform, content)
    }

    /// Store a scheduling attempt. Earlier `posted` rows survive so the
    /// derived status never moves backwards.
    pub fn record_posting(&mut self, outcomes: Vec<PostingOutcome>, summary: String) {
        let merged = merge_outcomes(self.posting_outcomes.as_deref(), outcomes);
        self.posting_outcomes = Some(merged);
        self.posting_summary = Some(summary);
    }
}

fn merge_outcomes(
    previous: Option<&[PostingOutcome]>,
    incoming: Vec<PostingOutcome>,
) -> Vec<PostingOutcome> {
    let Some(previous) = previous else {
        return incoming;
    };
    let mut merged = incoming;
    for old in previous
        .iter()
        .filter(|o| o.status == PostingStatus::Posted)
    {
        match merged.iter_mut().find(|o| o.same_platform(old)) {
            Some(slot) if slot.status != PostingStatus::Posted => *slot = old.clone(),
            Some(_) => {}
            None => merged.push(old.clone()),
        }
    }
    merged
}

/// On-disk shape of a batch. `status` is written for external readers and
/// ignored when loading.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBatch {
    id: BatchId,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    topic: String,
    #[serde(default, deserialize_with = "known_platforms")]
    platforms: PlatformSet,
    #[serde(default)]
    trend_summary: Option<TrendInsights>,
    #[serde(default)]
    scripts: Option<Scripts>,
    #[serde(default)]
    posting_results: Option<Vec<PostingOutcome>>,
    #[serde(default)]
    posting_summary: Option<String>,
    #[serde(default)]
    status: Option<BatchStatus>,
}

impl From<ContentBatch> for StoredBatch {
    fn from(b: ContentBatch) -> Self {
        let status = Some(b.status());
        StoredBatch {
            id: b.id,
            timestamp: b.created_at,
            topic: b.topic,
            platforms: b.platforms,
            trend_summary: b.trend_insights,
            scripts: Some(b.scripts),
            posting_results: b.posting_outcomes,
            posting_summary: b.posting_summary,
            status,
        }
    }
}

impl From<StoredBatch> for ContentBatch {
    fn from(s: StoredBatch) -> Self {
        let mut scripts = s.scripts.unwrap_or_default();
        scripts.retain_platforms(&s.platforms);
        ContentBatch {
            id: s.id,
            created_at: s.timestamp,
            topic: s.topic,
            platforms: s.platforms,
            trend_insights: s.trend_summary,
            scripts,
            posting_outcomes: s.posting_results,
            posting_summary: s.posting_summary,
        }
    }
}
