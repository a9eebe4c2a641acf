//! Viewport classification and the media box sizes derived from it.
//!
//! [`MediaSizes`] is constructed once by the host and handed to consumers by
//! reference. Resize events are coalesced to one recomputation per animation
//! frame: [`MediaSizes::request_resize`] replaces any pending request and
//! [`MediaSizes::on_animation_frame`] applies it. Listeners subscribe to
//! [`ScreenChange`] notifications, which are published only when the
//! classification actually changes.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

const MOBILE_SIZE: u32 = 600;
const MEDIUM_SIZE: u32 = 1275;
const LARGE_SIZE: u32 = 1680;

const SCREEN_THRESHOLDS: [(ScreenSize, u32); 3] = [
    (ScreenSize::Mobile, MOBILE_SIZE),
    (ScreenSize::Medium, MEDIUM_SIZE),
    (ScreenSize::Large, LARGE_SIZE),
];

const SCREEN_EVENTS_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenSize {
    Mobile,
    Medium,
    Large,
}

impl ScreenSize {
    pub fn classify(width: u32) -> Self {
        for (idx, (_, threshold)) in SCREEN_THRESHOLDS.iter().enumerate().rev() {
            if *threshold < width {
                let next = SCREEN_THRESHOLDS
                    .get(idx + 1)
                    .unwrap_or(&SCREEN_THRESHOLDS[idx]);
                return next.0;
            }
        }
        SCREEN_THRESHOLDS[0].0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaSize {
    pub width: f64,
    pub height: f64,
}

impl MediaSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub const fn square(side: f64) -> Self {
        Self::new(side, side)
    }

    /// Scales `self` into `bounds`, never enlarging past the natural size.
    pub fn aspect_fitted(&self, bounds: MediaSize) -> MediaSize {
        calc_image_in_box(self.width, self.height, bounds.width, bounds.height, true)
    }

    /// Scales `self` into `bounds`, enlarging small images to fill it.
    pub fn aspect_covered(&self, bounds: MediaSize) -> MediaSize {
        calc_image_in_box(self.width, self.height, bounds.width, bounds.height, false)
    }
}

pub fn calc_image_in_box(
    image_w: f64,
    image_h: f64,
    box_w: f64,
    box_h: f64,
    no_zoom: bool,
) -> MediaSize {
    if image_w <= 0.0 || image_h <= 0.0 {
        return MediaSize::square(box_w.min(box_h));
    }

    if no_zoom && image_w < box_w && image_h < box_h {
        return MediaSize::new(image_w, image_h);
    }

    let mut width = box_w;
    let mut height = box_h;
    if image_w / image_h > box_w / box_h {
        height = image_h * box_w / image_w;
    } else {
        width = image_w * box_h / image_h;
        if width > box_w {
            height = height * box_w / width;
            width = box_w;
        }
    }

    if no_zoom && width >= image_w && height >= image_h {
        width = image_w;
        height = image_h;
    }

    MediaSize::new(width, height)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaTypeSizes {
    pub regular: MediaSize,
    pub webpage: MediaSize,
    /// Album boxes only bound the width; height is derived from the layout.
    pub album: MediaSize,
    pub esg_sticker: MediaSize,
}

pub const HANDHELD_SIZES: MediaTypeSizes = MediaTypeSizes {
    regular: MediaSize::new(270.0, 270.0),
    webpage: MediaSize::new(270.0, 200.0),
    album: MediaSize::new(270.0, 0.0),
    esg_sticker: MediaSize::new(68.0, 68.0),
};

pub const DESKTOP_SIZES: MediaTypeSizes = MediaTypeSizes {
    regular: MediaSize::new(400.0, 320.0),
    webpage: MediaSize::new(400.0, 320.0),
    album: MediaSize::new(420.0, 0.0),
    esg_sticker: MediaSize::new(80.0, 80.0),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenChange {
    pub from: ScreenSize,
    pub to: ScreenSize,
}

pub struct MediaSizes {
    active_screen: ScreenSize,
    pending_width: Option<u32>,
    events: broadcast::Sender<ScreenChange>,
}

impl MediaSizes {
    pub fn new(initial_width: u32) -> Self {
        let (events, _) = broadcast::channel(SCREEN_EVENTS_CAPACITY);
        let active_screen = ScreenSize::classify(initial_width);
        debug!(width = initial_width, screen = ?active_screen, "initial screen classification");
        Self {
            active_screen,
            pending_width: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScreenChange> {
        self.events.subscribe()
    }

    pub fn active_screen(&self) -> ScreenSize {
        self.active_screen
    }

    pub fn is_mobile(&self) -> bool {
        self.active_screen == ScreenSize::Mobile
    }

    pub fn active(&self) -> &'static MediaTypeSizes {
        if self.is_mobile() {
            &HANDHELD_SIZES
        } else {
            &DESKTOP_SIZES
        }
    }

    /// Schedules a recomputation for the next animation frame, replacing any
    /// request that has not run yet.
    pub fn request_resize(&mut self, width: u32) {
        self.pending_width = Some(width);
    }

    pub fn has_pending_resize(&self) -> bool {
        self.pending_width.is_some()
    }

    /// Runs the pending recomputation, if any.
    pub fn on_animation_frame(&mut self) -> Option<ScreenChange> {
        let width = self.pending_width.take()?;
        self.handle_resize(width)
    }

    pub fn handle_resize(&mut self, width: u32) -> Option<ScreenChange> {
        let next = ScreenSize::classify(width);
        if next == self.active_screen {
            return None;
        }

        let change = ScreenChange {
            from: self.active_screen,
            to: next,
        };
        self.active_screen = next;
        info!(width, from = ?change.from, to = ?change.to, "screen classification changed");
        // No receivers is fine; the change is still applied.
        let _ = self.events.send(change);
        Some(change)
    }
}

#[cfg(test)]
#[path = "tests/media_sizes_tests.rs"]
mod tests;
