//! Scripted composer session against in-process collaborators that log every
//! call they receive.

use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_ui::{
    attachments::{AttachIntent, ImageHeaderProbe, MediaMetadata, MediaProbe},
    collaborators::{ApiInvoker, ChatSession, Collaborators, MessagesManager, WebPageCache},
    emoji_hover::{EmojiPanel, EmojiPanelHover},
    pinned::{BannerContent, BannerHost, BannerKind, BannerRegistry, ScrollContainer, Toolbar},
    rich_text::{BasicRichText, RichTextProcessor},
    Composer, MediaSizes, PinnedBanner, Settings,
};
use chrono::Utc;
use serde_json::{json, Value};
use shared::{
    domain::{
        Dialog, EditMessageOptions, FileSource, Message, MessageId, PeerId, SendAlbumOptions,
        SendFileOptions, SendTextOptions, TypingAction, WebPagePreview,
    },
    error::{RpcError, RpcErrorCode},
    protocol::ApiRequest,
};
use tokio::time::Instant;
use tracing::{info, warn};

const PEER: PeerId = PeerId(1);
const INITIAL_SCROLL_TOP: f64 = 1000.0;

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<Value>>>);

impl CallLog {
    fn record(&self, entry: Value) {
        info!(call = %entry, "collaborator called");
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn entries(&self) -> Vec<Value> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

struct LoggingMessages {
    log: CallLog,
    last_id: AtomicI64,
}

impl LoggingMessages {
    fn next_id(&self) -> i64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl MessagesManager for LoggingMessages {
    async fn send_text(&self, peer_id: PeerId, text: &str, options: SendTextOptions) -> Result<()> {
        let id = self.next_id();
        self.log.record(json!({
            "call": "send_text", "id": id, "peer_id": peer_id, "text": text, "options": options,
        }));
        Ok(())
    }

    async fn send_file(
        &self,
        peer_id: PeerId,
        file: &FileSource,
        options: SendFileOptions,
    ) -> Result<()> {
        let id = self.next_id();
        self.log.record(json!({
            "call": "send_file", "id": id, "peer_id": peer_id, "file": file.name, "options": options,
        }));
        Ok(())
    }

    async fn send_album(
        &self,
        peer_id: PeerId,
        files: &[FileSource],
        options: SendAlbumOptions,
    ) -> Result<()> {
        let id = self.next_id();
        let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
        self.log.record(json!({
            "call": "send_album", "id": id, "peer_id": peer_id, "files": names, "options": options,
        }));
        Ok(())
    }

    async fn edit_message(
        &self,
        message_id: MessageId,
        text: &str,
        options: EditMessageOptions,
    ) -> Result<()> {
        self.log.record(json!({
            "call": "edit_message", "message_id": message_id, "text": text, "options": options,
        }));
        Ok(())
    }

    async fn get_message(&self, _message_id: MessageId) -> Result<Option<Message>> {
        Ok(None)
    }

    async fn get_dialog_by_peer_id(&self, peer_id: PeerId) -> Result<Option<Dialog>> {
        let last = self.last_id.load(Ordering::SeqCst);
        Ok(Some(Dialog {
            peer_id,
            top_message: (last > 0).then_some(MessageId(last)),
        }))
    }

    async fn read_history(&self, peer_id: PeerId, up_to: MessageId) -> Result<()> {
        self.log.record(json!({"call": "read_history", "peer_id": peer_id, "up_to": up_to}));
        Ok(())
    }
}

/// Answers every preview request with the URL's host as site name. Hosts under
/// `.invalid` have no page.
struct StaticWebPages;

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}

#[async_trait]
impl ApiInvoker for StaticWebPages {
    async fn invoke(&self, request: ApiRequest) -> Result<Value> {
        let ApiRequest::GetWebPage { url, .. } = request;
        let host = host_of(&url);
        if host.ends_with(".invalid") {
            return Err(RpcError::new(RpcErrorCode::NotFound, format!("no page for {url}")).into());
        }
        Ok(json!({ "url": url, "site_name": host, "description": format!("Preview of {host}") }))
    }
}

struct LoggingCache(CallLog);

impl WebPageCache for LoggingCache {
    fn save_web_page(&self, page: &WebPagePreview) {
        self.0.record(json!({"call": "save_web_page", "url": page.url}));
    }
}

struct LoggingSession(CallLog);

impl ChatSession for LoggingSession {
    fn peer_id(&self) -> Option<PeerId> {
        Some(PEER)
    }

    fn set_typing(&self, action: TypingAction) {
        self.0.record(json!({"call": "set_typing", "action": action}));
    }

    fn scroll_to_bottom(&self) {
        self.0.record(json!({"call": "scroll_to_bottom"}));
    }
}

/// Stands in for a container parser; every clip is 720p and 12 seconds long.
struct FixedVideoProbe;

#[async_trait]
impl MediaProbe for FixedVideoProbe {
    async fn probe_image(&self, file: &FileSource) -> Result<MediaMetadata> {
        ImageHeaderProbe::new().probe_image(file).await
    }

    async fn probe_video(&self, _file: &FileSource) -> Result<MediaMetadata> {
        Ok(MediaMetadata {
            width: 1280,
            height: 720,
            duration_seconds: Some(12),
        })
    }
}

struct LoggingToolbar(CallLog);

impl Toolbar for LoggingToolbar {
    fn set_utils_width(&self) {
        self.0.record(json!({"call": "set_utils_width"}));
    }
}

struct Scroll(Mutex<f64>);

impl ScrollContainer for Scroll {
    fn scroll_top(&self) -> f64 {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_scroll_top(&self, value: f64) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

struct LoggingContent(CallLog);

impl BannerContent for LoggingContent {
    fn fill(&self, title: &str, subtitle: &str, message: &Message) {
        self.0.record(json!({
            "call": "fill_banner", "title": title, "subtitle": subtitle, "message_id": message.id,
        }));
    }
}

struct LoggingPanel(CallLog);

impl EmojiPanel for LoggingPanel {
    fn init(&mut self) {
        self.0.record(json!({"call": "emoji_panel_init"}));
    }

    fn set_active(&mut self, active: bool) {
        self.0.record(json!({"call": "emoji_panel_active", "active": active}));
    }

    fn check_lazy_queue(&mut self) {
        self.0.record(json!({"call": "emoji_panel_lazy_queue"}));
    }

    fn check_animations(&mut self, paused: bool) {
        self.0.record(json!({"call": "emoji_panel_animations", "paused": paused}));
    }
}

fn png(name: &str, width: u32, height: u32) -> Result<FileSource> {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| format!("failed to encode {name}"))?;
    Ok(FileSource::new(name, "image/png", bytes))
}

pub async fn run(settings: Settings, width: u32, text: &str, caption: &str) -> Result<Value> {
    let log = CallLog::default();
    let rich_text = Arc::new(BasicRichText::new(false));
    let collaborators = Collaborators {
        messages: Arc::new(LoggingMessages {
            log: log.clone(),
            last_id: AtomicI64::new(0),
        }),
        api: Arc::new(StaticWebPages),
        web_pages: Arc::new(LoggingCache(log.clone())),
        session: Arc::new(LoggingSession(log.clone())),
        rich_text: rich_text.clone(),
        media_probe: Arc::new(FixedVideoProbe),
    };
    let composer = Composer::new(collaborators, settings.clone());

    let outcome = composer.handle_input(rich_text.wrap_rich_text(text)).await;
    let preview_applied = match outcome.lookup {
        Some(lookup) => match lookup.spawn().await? {
            Ok(applied) => applied,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "web page preview failed");
                false
            }
        },
        None => false,
    };
    let view_after_input = composer.view().await;
    let sent_text = composer.send_message().await?;

    composer.select_attach_intent(AttachIntent::Media).await;
    let popup = composer
        .attach_files(vec![
            png("landscape.png", 640, 480)?,
            png("portrait.png", 480, 640)?,
            FileSource::new("clip.mp4", "video/mp4", Vec::new()),
            FileSource::new("notes.pdf", "application/pdf", Vec::new()),
        ])
        .await?;
    if popup.is_some() {
        composer.set_caption(caption).await;
        composer.send_attachments().await?;
    }

    let sizes = MediaSizes::new(width);
    let scroll = Arc::new(Scroll(Mutex::new(INITIAL_SCROLL_TOP)));
    let registry = Arc::new(BannerRegistry::new());
    let host = BannerHost {
        registry: registry.clone(),
        toolbar: Arc::new(LoggingToolbar(log.clone())),
        scroll: scroll.clone(),
    };
    let mut banner = PinnedBanner::new(
        BannerKind::Message,
        host,
        Arc::new(LoggingContent(log.clone())),
        None,
        settings.pinned_banner_height,
    );
    let pinned = Message {
        id: MessageId(1),
        peer_id: PEER,
        text: text.to_string(),
        reply_to_id: None,
        sent_at: Utc::now(),
    };
    banner.fill("Pinned Message", &pinned.text, &pinned);
    banner.toggle(&sizes, None);
    let shown = json!({
        "classes": banner.class_list(),
        "toolbar_classes": registry.toolbar_classes(),
        "scroll_top": scroll.scroll_top(),
    });
    banner.handle_close_click(&sizes).await?;
    let closed = json!({
        "classes": banner.class_list(),
        "toolbar_classes": registry.toolbar_classes(),
        "scroll_top": scroll.scroll_top(),
    });

    let mut hover = EmojiPanelHover::new(LoggingPanel(log.clone()), settings.emoji_close_delay());
    hover.on_toggle_enter();
    let left_at = Instant::now();
    hover.on_leave(left_at);
    let emoji_closed = hover.tick(left_at + settings.emoji_close_delay());

    Ok(json!({
        "screen": sizes.active_screen(),
        "preview_applied": preview_applied,
        "view_after_input": view_after_input,
        "sent_text": sent_text,
        "popup": popup,
        "final_view": composer.view().await,
        "live_preview_urls": composer.preview_urls().live_count(),
        "banner": { "shown": shown, "closed": closed },
        "emoji_panel_closed": emoji_closed,
        "calls": log.entries(),
    }))
}
