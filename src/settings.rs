//! Operator preferences stored through the persistence port.
use crate::kv::{KvStore, BRAND_VOICE_KEY, DEFAULT_PLATFORMS_KEY};
use crate::model::{all_platforms, Platform, PlatformSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Values {
    default_platforms: PlatformSet,
    brand_voice: String,
}

pub struct Settings {
    kv: Arc<dyn KvStore>,
    values: Mutex<Values>,
}

impl Settings {
    /// Missing or unreadable default platforms mean "all six"; unknown names
    /// are dropped. A missing brand voice is empty.
    #[instrument(skip_all)]
    pub async fn load(kv: Arc<dyn KvStore>) -> Self {
        let default_platforms = match kv.get(DEFAULT_PLATFORMS_KEY).await {
            Ok(Some(raw)) => parse_platform_list(&raw).unwrap_or_else(|| {
                warn!("stored default platforms are unreadable; using all");
                all_platforms()
            }),
            Ok(None) => all_platforms(),
            Err(err) => {
                warn!(?err, "failed to read default platforms");
                all_platforms()
            }
        };
        let brand_voice = match kv.get(BRAND_VOICE_KEY).await {
            Ok(voice) => voice.unwrap_or_default(),
            Err(err) => {
                warn!(?err, "failed to read brand voice");
                String::new()
            }
        };
        Self {
            kv,
            values: Mutex::new(Values {
                default_platforms,
                brand_voice,
            }),
        }
    }

    fn values(&self) -> MutexGuard<'_, Values> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_platforms(&self) -> PlatformSet {
        self.values().default_platforms.clone()
    }

    pub fn brand_voice(&self) -> String {
        self.values().brand_voice.clone()
    }

    /// Trimmed brand voice, or `fallback` when none is saved.
    pub fn effective_voice(&self, fallback: &str) -> String {
        let voice = self.values().brand_voice.trim().to_string();
        if voice.is_empty() {
            fallback.to_string()
        } else {
            voice
        }
    }

    pub async fn save_default_platforms(&self, platforms: PlatformSet) {
        let names: Vec<&str> = platforms.iter().map(Platform::as_str).collect();
        self.values().default_platforms = platforms.clone();
        match serde_json::to_string(&names) {
            Ok(raw) => {
                if let Err(err) = self.kv.set(DEFAULT_PLATFORMS_KEY, &raw).await {
                    warn!(?err, "failed to persist default platforms");
                }
            }
            Err(err) => warn!(?err, "failed to serialize default platforms"),
        }
    }

    pub async fn save_brand_voice(&self, voice: &str) {
        self.values().brand_voice = voice.to_string();
        if let Err(err) = self.kv.set(BRAND_VOICE_KEY, voice).await {
            warn!(?err, "failed to persist brand voice");
        }
    }
}

fn parse_platform_list(raw: &str) -> Option<PlatformSet> {
    let names: Vec<serde_json::Value> = serde_json::from_str(raw).ok()?;
    Some(
        names
            .iter()
            .filter_map(serde_json::Value::as_str)
            .filter_map(Platform::parse_platform)
            .collect(),
    )
}
