//! Replay window: drops updates outside `[from, until]` and, when set, for other prefixes.
//! Applied in code even when the underlying source already filters.

use super::{RouteUpdate, UpdateSource};
use crate::config::ReplayConfig;
use crate::error::FeedError;
use async_trait::async_trait;

pub struct ReplayWindow<S> {
    inner: S,
    from: Option<i64>,
    until: Option<i64>,
    prefix: Option<String>,
}

impl<S: UpdateSource> ReplayWindow<S> {
    pub fn new(inner: S, from: Option<i64>, until: Option<i64>, prefix: Option<String>) -> Self {
        Self {
            inner,
            from,
            until,
            prefix,
        }
    }

    pub fn from_config(inner: S, config: &ReplayConfig) -> Self {
        Self::new(
            inner,
            config.from.map(|t| t.timestamp()),
            config.until.map(|t| t.timestamp()),
            config.prefix.clone(),
        )
    }

    fn admits(&self, update: &RouteUpdate) -> bool {
        if self.from.is_some_and(|from| update.timestamp < from) {
            return false;
        }
        if self.until.is_some_and(|until| update.timestamp > until) {
            return false;
        }
        match &self.prefix {
            Some(p) => &update.prefix == p,
            None => true,
        }
    }
}

#[async_trait]
impl<S: UpdateSource> UpdateSource for ReplayWindow<S> {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError> {
        while let Some(update) = self.inner.next_update().await? {
            if self.admits(&update) {
                return Ok(Some(update));
            }
        }
        Ok(None)
    }
}
