//! Hover behaviour of the emoji panel toggle.
//!
//! Opening is immediate; closing waits for a short delay so moving the
//! pointer from the toggle onto the panel does not flicker. The pending close
//! is a deadline owned by [`EmojiPanelHover`]; re-entering replaces it with
//! nothing, and the host drives expiry through [`EmojiPanelHover::tick`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

pub trait EmojiPanel {
    /// Builds the panel on first use; it is shown once built.
    fn init(&mut self);
    fn set_active(&mut self, active: bool);
    fn check_lazy_queue(&mut self);
    fn check_animations(&mut self, paused: bool);
}

pub struct EmojiPanelHover<P: EmojiPanel> {
    panel: P,
    close_delay: Duration,
    initialized: bool,
    open: bool,
    close_deadline: Option<Instant>,
}

impl<P: EmojiPanel> EmojiPanelHover<P> {
    pub fn new(panel: P, close_delay: Duration) -> Self {
        Self {
            panel,
            close_delay,
            initialized: false,
            open: false,
            close_deadline: None,
        }
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn has_pending_close(&self) -> bool {
        self.close_deadline.is_some()
    }

    pub fn on_toggle_enter(&mut self) {
        self.close_deadline = None;
        if self.initialized {
            self.panel.set_active(true);
            self.panel.check_lazy_queue();
        } else {
            self.panel.init();
            self.initialized = true;
        }
        self.open = true;
        self.panel.check_animations(false);
    }

    pub fn on_panel_enter(&mut self) {
        self.close_deadline = None;
    }

    /// Pointer left the toggle or the panel.
    pub fn on_leave(&mut self, now: Instant) {
        if !self.initialized {
            return;
        }
        self.close_deadline = Some(now + self.close_delay);
    }

    /// Fires an expired close. Returns true when the panel was closed.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.close_deadline {
            Some(deadline) if deadline <= now => {
                self.close_deadline = None;
                self.open = false;
                self.panel.set_active(false);
                self.panel.check_animations(true);
                debug!("emoji panel closed");
                true
            }
            _ => false,
        }
    }
}
