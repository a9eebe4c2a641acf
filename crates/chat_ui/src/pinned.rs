//! Pinned-content banners above the conversation.
//!
//! Every banner kind shares one [`BannerRegistry`]; the toolbar's
//! `is-pinned-<kind>-shown` classes are derived from it rather than stored
//! separately, so banner state and toolbar state cannot drift apart.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use shared::domain::{Message, MessageId};
use tracing::debug;

use crate::media_sizes::MediaSizes;
use crate::EventDisposition;

const CONTAINER_CLASS: &str = "pinned-container";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind {
    Message,
    Audio,
}

impl BannerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BannerKind::Message => "message",
            BannerKind::Audio => "audio",
        }
    }

    pub fn toolbar_class(self) -> String {
        format!("is-pinned-{}-shown", self.as_str())
    }
}

/// Number of visible banner kinds.
pub fn active_count(visibility: &BTreeMap<BannerKind, bool>) -> usize {
    visibility.values().filter(|visible| **visible).count()
}

#[derive(Debug, Default)]
pub struct BannerRegistry {
    visibility: Mutex<BTreeMap<BannerKind, bool>>,
}

impl BannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `kind`'s visibility and returns the active count including
    /// this write.
    pub fn set_visible(&self, kind: BannerKind, visible: bool) -> usize {
        let mut visibility = self.visibility.lock().unwrap_or_else(PoisonError::into_inner);
        visibility.insert(kind, visible);
        active_count(&visibility)
    }

    pub fn is_visible(&self, kind: BannerKind) -> bool {
        self.visibility
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        active_count(&self.visibility.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn toolbar_classes(&self) -> Vec<String> {
        self.visibility
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, visible)| **visible)
            .map(|(kind, _)| kind.toolbar_class())
            .collect()
    }
}

pub trait Toolbar: Send + Sync {
    /// Banner presence changes the room left for the utility buttons.
    fn set_utils_width(&self);
}

pub trait ScrollContainer: Send + Sync {
    fn scroll_top(&self) -> f64;
    fn set_scroll_top(&self, value: f64);
}

pub trait BannerContent: Send + Sync {
    fn fill(&self, title: &str, subtitle: &str, message: &Message);
}

/// Asked before a close click hides the banner.
#[async_trait]
pub trait CloseConfirm: Send + Sync {
    async fn confirm(&self) -> Result<bool>;
}

/// Chat-level pieces every banner of one conversation view shares.
#[derive(Clone)]
pub struct BannerHost {
    pub registry: Arc<BannerRegistry>,
    pub toolbar: Arc<dyn Toolbar>,
    pub scroll: Arc<dyn ScrollContainer>,
}

pub struct PinnedBanner {
    kind: BannerKind,
    host: BannerHost,
    content: Arc<dyn BannerContent>,
    on_close: Option<Arc<dyn CloseConfirm>>,
    height: f64,
    visible: bool,
    floating: bool,
    message_id: Option<MessageId>,
}

impl PinnedBanner {
    /// Banners start hidden.
    pub fn new(
        kind: BannerKind,
        host: BannerHost,
        content: Arc<dyn BannerContent>,
        on_close: Option<Arc<dyn CloseConfirm>>,
        height: f64,
    ) -> Self {
        Self {
            kind,
            host,
            content,
            on_close,
            height,
            visible: false,
            floating: false,
            message_id: None,
        }
    }

    pub fn kind(&self) -> BannerKind {
        self.kind
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Id of the message last shown through [`PinnedBanner::fill`].
    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    pub fn class_list(&self) -> Vec<&'static str> {
        let mut classes = vec![CONTAINER_CLASS];
        if !self.visible {
            classes.push("hide");
        }
        if self.floating {
            classes.push("is-floating");
        }
        classes
    }

    pub fn close_button_classes(&self) -> Vec<String> {
        vec![
            format!("{CONTAINER_CLASS}-close"),
            format!("pinned-{}-close", self.kind.as_str()),
            "btn-icon".to_string(),
            "tgico-close".to_string(),
        ]
    }

    /// Shows or hides the banner; `None` flips the current state. Returns
    /// false when the banner already was in the requested state.
    pub fn toggle(&mut self, sizes: &MediaSizes, hide: Option<bool>) -> bool {
        let hidden = !self.visible;
        let hide = hide.unwrap_or(!hidden);
        if hide == hidden {
            return false;
        }

        let mobile = sizes.is_mobile();
        self.floating = mobile;
        let scroll_top = mobile.then(|| self.host.scroll.scroll_top());

        self.visible = !hide;
        let active = self.host.registry.set_visible(self.kind, self.visible);

        // Only the first banner to appear or the last to go shifts content.
        let max_active = if hide { 0 } else { 1 };
        if let Some(scroll_top) = scroll_top {
            if active <= max_active {
                let delta = if hide { -self.height } else { self.height };
                self.host.scroll.set_scroll_top(scroll_top + delta);
                debug!(kind = ?self.kind, delta, "compensated banner scroll");
            }
        }

        self.host.toolbar.set_utils_width();
        debug!(kind = ?self.kind, visible = self.visible, active, "pinned banner toggled");
        true
    }

    pub fn fill(&mut self, title: &str, subtitle: &str, message: &Message) {
        self.message_id = Some(message.id);
        self.content.fill(title, subtitle, message);
        self.host.toolbar.set_utils_width();
    }

    /// Close button. The click never reaches other handlers; the banner hides
    /// unless the close confirmation declines.
    pub async fn handle_close_click(&mut self, sizes: &MediaSizes) -> Result<EventDisposition> {
        let close = match &self.on_close {
            Some(on_close) => on_close.confirm().await?,
            None => true,
        };
        if close {
            self.toggle(sizes, Some(true));
        }
        Ok(EventDisposition::Consumed)
    }
}

#[cfg(test)]
#[path = "tests/pinned_tests.rs"]
mod tests;
