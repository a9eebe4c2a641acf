//! Message composer and pinned-banner state for the chat client UI.
//!
//! Everything here is host-agnostic: DOM-like effects are expressed as state
//! the host renders, and application services are injected as traits from
//! [`collaborators`].

pub mod album_layout;
pub mod attachments;
pub mod collaborators;
pub mod composer;
pub mod config;
pub mod emoji_hover;
pub mod error;
pub mod input;
pub mod media_sizes;
pub mod pinned;
pub mod rich_text;
pub mod typing;

pub use composer::{Composer, ComposerView};
pub use config::{load_settings, Settings};
pub use error::ComposerError;
pub use media_sizes::{MediaSizes, ScreenChange, ScreenSize};
pub use pinned::{BannerKind, BannerRegistry, PinnedBanner};

/// Whether a handler took over an interaction or left it to the host default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    PassThrough,
    Consumed,
}
