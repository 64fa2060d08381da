//! Read-only queries over history entries.
use crate::model::{BatchStatus, ContentBatch, Platform};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(BatchStatus),
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        s.parse().map(StatusFilter::Only)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlatformFilter {
    #[default]
    All,
    Only(Platform),
}

impl FromStr for PlatformFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(PlatformFilter::All);
        }
        s.parse()
            .map(PlatformFilter::Only)
            .map_err(|e: crate::model::UnknownPlatform| e.to_string())
    }
}

/// Filter criteria. Date bounds are whole UTC days, both inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub status: StatusFilter,
    pub platform: PlatformFilter,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl HistoryQuery {
    pub fn matches(&self, entry: &ContentBatch) -> bool {
        if let StatusFilter::Only(status) = self.status {
            if entry.status() != status {
                return false;
            }
        }
        if let PlatformFilter::Only(platform) = self.platform {
            if !entry.platforms().contains(&platform) {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if entry.created_at() < start_of_day(from) {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if entry.created_at() > end_of_day(to) {
                return false;
            }
        }
        true
    }
}

fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

// 23:59:59.999
fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    day.and_time(last).and_utc()
}

/// Subsequence of `entries` matching `query`, in the original order.
pub fn filter<'a>(entries: &'a [ContentBatch], query: &HistoryQuery) -> Vec<&'a ContentBatch> {
    entries.iter().filter(|e| query.matches(e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlatformSet, PostingOutcome, PostingStatus, Scripts};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap() + chrono::Duration::milliseconds(ms as i64)
    }

    fn entry(platforms: &[Platform], created: DateTime<Utc>) -> ContentBatch {
        let set: PlatformSet = platforms.iter().copied().collect();
        ContentBatch::new("topic", set, None, Scripts::new()).with_created_at(created)
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> Vec<ContentBatch> {
        let mut posted = entry(&[Platform::Twitter], at(2026, 3, 10, 9, 0, 0, 0));
        posted.record_posting(
            vec![PostingOutcome {
                platform: "Twitter".into(),
                status: PostingStatus::Posted,
                message: String::new(),
                post_url: None,
            }],
            String::new(),
        );
        let mut scheduled = entry(&[Platform::LinkedIn], at(2026, 3, 5, 23, 59, 59, 999));
        scheduled.record_posting(Vec::new(), String::new());
        let draft = entry(&[Platform::Twitter, Platform::TikTok], at(2026, 3, 1, 0, 0, 0, 0));
        vec![posted, scheduled, draft]
    }

    #[test]
    fn default_query_returns_everything() {
        let entries = sample();
        let out = filter(&entries, &HistoryQuery::default());
        assert_eq!(out.len(), entries.len());
        for (a, b) in out.iter().zip(entries.iter()) {
            assert_eq!(a.id(), b.id());
        }
    }

    #[test]
    fn status_and_platform_narrow() {
        let entries = sample();
        let q = HistoryQuery {
            status: StatusFilter::Only(BatchStatus::Scheduled),
            ..Default::default()
        };
        let out = filter(&entries, &q);
        assert_eq!(out.len(), 1);
        assert!(out[0].platforms().contains(&Platform::LinkedIn));

        let q = HistoryQuery {
            platform: PlatformFilter::Only(Platform::Twitter),
            ..Default::default()
        };
        let out = filter(&entries, &q);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id(), entries[0].id());
        assert_eq!(out[1].id(), entries[2].id());
    }

    #[test]
    fn date_to_includes_the_whole_day() {
        let entries = sample();
        let q = HistoryQuery {
            date_to: Some(day("2026-03-05")),
            ..Default::default()
        };
        let out = filter(&entries, &q);
        assert_eq!(out.len(), 2);

        let q = HistoryQuery {
            date_from: Some(day("2026-03-02")),
            date_to: Some(day("2026-03-05")),
            ..Default::default()
        };
        let out = filter(&entries, &q);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id(), entries[1].id());
    }

    #[test]
    fn date_from_is_inclusive() {
        let entries = sample();
        let q = HistoryQuery {
            date_from: Some(day("2026-03-01")),
            ..Default::default()
        };
        assert_eq!(filter(&entries, &q).len(), 3);
        let q = HistoryQuery {
            date_from: Some(day("2026-03-11")),
            ..Default::default()
        };
        assert!(filter(&entries, &q).is_empty());
    }

    #[test]
    fn parse_filters() {
        assert_eq!("all".parse::<StatusFilter>(), Ok(StatusFilter::All));
        assert_eq!(
            "Posted".parse::<StatusFilter>(),
            Ok(StatusFilter::Only(BatchStatus::Posted))
        );
        assert_eq!(
            "tiktok".parse::<PlatformFilter>(),
            Ok(PlatformFilter::Only(Platform::TikTok))
        );
        assert!("orkut".parse::<PlatformFilter>().is_err());
    }
}
