use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Inner {
    url: Option<String>,
    bots: BTreeSet<String>,
}

/// The meeting the bots were last sent to, and the bots currently in it.
#[derive(Clone, Debug, Default)]
pub struct MeetingContext {
    inner: Arc<RwLock<Inner>>,
}

impl MeetingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.inner.write().unwrap_or_else(|e| e.into_inner()).url = Some(url.into());
    }

    pub fn url(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).url.clone()
    }

    /// Returns the number of tracked bots.
    pub fn track_bot(&self, bot_id: impl Into<String>) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.bots.insert(bot_id.into());
        inner.bots.len()
    }

    /// Returns the number of tracked bots.
    pub fn untrack_bot(&self, bot_id: &str) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.bots.remove(bot_id);
        inner.bots.len()
    }

    pub fn active_bots(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.bots.iter().cloned().collect()
    }
}
