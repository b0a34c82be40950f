//! Rest-period shorts queue
//!
//! Video ids come from a [`ShortsSource`]; the curator caches the last
//! fetch for a configurable TTL and falls back to the stale cache when
//! the source fails.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Served when nothing is configured
pub const FALLBACK_VIDEO_IDS: [&str; 3] = ["dQw4w9WgXcQ", "jNQXAC9IVRw", "yPYZpwSpKmA"];

/// Upper bound for one queue request
pub const MAX_QUEUE_SIZE: usize = 50;

/// Provider of candidate video ids
pub trait ShortsSource: Send + Sync {
    /// Up to `count` ids, in feed order
    fn fetch(&self, count: usize) -> Result<Vec<String>>;
}

/// Configured ids, padded with [`FALLBACK_VIDEO_IDS`]
#[derive(Debug, Clone, Default)]
pub struct StaticShortsSource {
    video_ids: Vec<String>,
}

impl StaticShortsSource {
    pub fn new(video_ids: Vec<String>) -> Self {
        Self { video_ids }
    }
}

impl ShortsSource for StaticShortsSource {
    fn fetch(&self, count: usize) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::with_capacity(count);
        let candidates = self
            .video_ids
            .iter()
            .map(String::as_str)
            .chain(FALLBACK_VIDEO_IDS);

        for id in candidates {
            if ids.len() == count {
                break;
            }
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }

        Ok(ids)
    }
}

struct CachedQueue {
    ids: Vec<String>,
    fetched_at: Instant,
}

/// TTL-cached queue over a [`ShortsSource`]
pub struct ShortsCurator {
    source: Arc<dyn ShortsSource>,
    ttl: Duration,
    cache: Mutex<Option<CachedQueue>>,
}

impl ShortsCurator {
    pub fn new(source: Arc<dyn ShortsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: Mutex::new(None),
        }
    }

    /// `count` ids (clamped to 1..=[`MAX_QUEUE_SIZE`]).
    ///
    /// A fresh cache holding enough ids is served as is; otherwise the
    /// source is asked for twice as many. If the source fails, a non-empty
    /// stale cache is served instead.
    pub async fn queue(&self, count: usize) -> Result<Vec<String>> {
        let count = count.clamp(1, MAX_QUEUE_SIZE);
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl && cached.ids.len() >= count {
                debug!("Serving {} shorts from cache", count);
                return Ok(cached.ids[..count].to_vec());
            }
        }

        match self.source.fetch(count * 2) {
            Ok(ids) => {
                let queue = ids.iter().take(count).cloned().collect();
                *cache = Some(CachedQueue {
                    ids,
                    fetched_at: Instant::now(),
                });
                Ok(queue)
            }
            Err(e) => match cache.as_ref() {
                Some(stale) if !stale.ids.is_empty() => {
                    warn!("Shorts source failed ({}); serving stale queue", e);
                    Ok(stale.ids.iter().take(count).cloned().collect())
                }
                _ => bail!("Failed to fetch shorts queue: {}", e),
            },
        }
    }
}
