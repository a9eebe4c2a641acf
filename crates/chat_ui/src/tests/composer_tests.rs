use super::*;

use std::{collections::HashMap, sync::Mutex as StdMutex, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use shared::{
    domain::Dialog,
    error::{RpcError, RpcErrorCode},
};
use tokio::sync::Notify;

use crate::attachments::{MediaMetadata, MediaProbe};
use crate::collaborators::{ChatSession, MessagesManager};
use crate::rich_text::BasicRichText;

const PEER: PeerId = PeerId(42);
const TOP_MESSAGE: MessageId = MessageId(99);
const OLD_MESSAGE: MessageId = MessageId(7);
const URL_A: &str = "https://a.example.com";
const URL_B: &str = "https://b.example.com";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Text {
        peer: PeerId,
        text: String,
        options: SendTextOptions,
    },
    File {
        peer: PeerId,
        name: String,
        options: SendFileOptions,
    },
    Album {
        peer: PeerId,
        names: Vec<String>,
        options: SendAlbumOptions,
    },
    Edit {
        id: MessageId,
        text: String,
        options: EditMessageOptions,
    },
    ReadHistory {
        peer: PeerId,
        up_to: MessageId,
    },
}

struct FakeMessages {
    calls: Mutex<Vec<Call>>,
    messages: HashMap<MessageId, Message>,
}

impl FakeMessages {
    fn new() -> Self {
        let old = Message {
            id: OLD_MESSAGE,
            peer_id: PEER,
            text: "old text".into(),
            reply_to_id: None,
            sent_at: Utc::now(),
        };
        Self {
            calls: Mutex::new(Vec::new()),
            messages: HashMap::from([(OLD_MESSAGE, old)]),
        }
    }

    async fn sends(&self) -> Vec<Call> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| !matches!(call, Call::ReadHistory { .. }))
            .cloned()
            .collect()
    }

    async fn all(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl MessagesManager for FakeMessages {
    async fn send_text(&self, peer_id: PeerId, text: &str, options: SendTextOptions) -> Result<()> {
        self.calls.lock().await.push(Call::Text {
            peer: peer_id,
            text: text.to_string(),
            options,
        });
        Ok(())
    }

    async fn send_file(
        &self,
        peer_id: PeerId,
        file: &FileSource,
        options: SendFileOptions,
    ) -> Result<()> {
        self.calls.lock().await.push(Call::File {
            peer: peer_id,
            name: file.name.clone(),
            options,
        });
        Ok(())
    }

    async fn send_album(
        &self,
        peer_id: PeerId,
        files: &[FileSource],
        options: SendAlbumOptions,
    ) -> Result<()> {
        self.calls.lock().await.push(Call::Album {
            peer: peer_id,
            names: files.iter().map(|file| file.name.clone()).collect(),
            options,
        });
        Ok(())
    }

    async fn edit_message(
        &self,
        message_id: MessageId,
        text: &str,
        options: EditMessageOptions,
    ) -> Result<()> {
        self.calls.lock().await.push(Call::Edit {
            id: message_id,
            text: text.to_string(),
            options,
        });
        Ok(())
    }

    async fn get_message(&self, message_id: MessageId) -> Result<Option<Message>> {
        Ok(self.messages.get(&message_id).cloned())
    }

    async fn get_dialog_by_peer_id(&self, peer_id: PeerId) -> Result<Option<Dialog>> {
        Ok(Some(Dialog {
            peer_id,
            top_message: Some(TOP_MESSAGE),
        }))
    }

    async fn read_history(&self, peer_id: PeerId, up_to: MessageId) -> Result<()> {
        self.calls.lock().await.push(Call::ReadHistory {
            peer: peer_id,
            up_to,
        });
        Ok(())
    }
}

struct FakeApi {
    pages: HashMap<String, serde_json::Value>,
}

#[async_trait]
impl ApiInvoker for FakeApi {
    async fn invoke(&self, request: ApiRequest) -> Result<serde_json::Value> {
        match request {
            ApiRequest::GetWebPage { url, .. } => self.pages.get(&url).cloned().ok_or_else(|| {
                anyhow!(RpcError::new(RpcErrorCode::NotFound, format!("no page for {url}")))
            }),
        }
    }
}

#[derive(Default)]
struct FakeCache {
    saved: StdMutex<Vec<String>>,
}

impl WebPageCache for FakeCache {
    fn save_web_page(&self, page: &WebPagePreview) {
        self.saved.lock().expect("cache lock").push(page.url.clone());
    }
}

struct FakeSession {
    peer: Option<PeerId>,
    typing: StdMutex<Vec<TypingAction>>,
    scrolls: StdMutex<usize>,
}

impl FakeSession {
    fn typing(&self) -> Vec<TypingAction> {
        self.typing.lock().expect("typing lock").clone()
    }

    fn scrolls(&self) -> usize {
        *self.scrolls.lock().expect("scroll lock")
    }
}

impl ChatSession for FakeSession {
    fn peer_id(&self) -> Option<PeerId> {
        self.peer
    }

    fn set_typing(&self, action: TypingAction) {
        self.typing.lock().expect("typing lock").push(action);
    }

    fn scroll_to_bottom(&self) {
        *self.scrolls.lock().expect("scroll lock") += 1;
    }
}

struct SquareProbe;

#[async_trait]
impl MediaProbe for SquareProbe {
    async fn probe_image(&self, _file: &FileSource) -> Result<MediaMetadata> {
        Ok(MediaMetadata {
            width: 100,
            height: 100,
            duration_seconds: None,
        })
    }

    async fn probe_video(&self, _file: &FileSource) -> Result<MediaMetadata> {
        Ok(MediaMetadata {
            width: 100,
            height: 100,
            duration_seconds: Some(3),
        })
    }
}

/// Holds back `slow.png` until released; everything else resolves at once.
#[derive(Default)]
struct GatedProbe {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl MediaProbe for GatedProbe {
    async fn probe_image(&self, file: &FileSource) -> Result<MediaMetadata> {
        if file.name == "slow.png" {
            self.entered.notify_one();
            self.release.notified().await;
        }
        SquareProbe.probe_image(file).await
    }

    async fn probe_video(&self, file: &FileSource) -> Result<MediaMetadata> {
        SquareProbe.probe_video(file).await
    }
}

struct Harness {
    composer: Composer,
    messages: Arc<FakeMessages>,
    cache: Arc<FakeCache>,
    session: Arc<FakeSession>,
}

fn harness_with(settings: Settings, peer: Option<PeerId>, emoji_supported: bool) -> Harness {
    harness_with_probe(settings, peer, emoji_supported, Arc::new(SquareProbe))
}

fn harness_with_probe(
    settings: Settings,
    peer: Option<PeerId>,
    emoji_supported: bool,
    media_probe: Arc<dyn MediaProbe>,
) -> Harness {
    let messages = Arc::new(FakeMessages::new());
    let cache = Arc::new(FakeCache::default());
    let session = Arc::new(FakeSession {
        peer,
        typing: StdMutex::new(Vec::new()),
        scrolls: StdMutex::new(0),
    });
    let api = Arc::new(FakeApi {
        pages: HashMap::from([
            (
                URL_A.to_string(),
                json!({"url": URL_A, "site_name": "A site", "description": "About A"}),
            ),
            (URL_B.to_string(), json!({"url": URL_B, "title": "B title"})),
            ("https://empty.example.com".to_string(), serde_json::Value::Null),
        ]),
    });

    let collaborators = Collaborators {
        messages: messages.clone(),
        api,
        web_pages: cache.clone(),
        session: session.clone(),
        rich_text: Arc::new(BasicRichText::new(emoji_supported)),
        media_probe,
    };

    Harness {
        composer: Composer::new(collaborators, settings),
        messages,
        cache,
        session,
    }
}

fn harness() -> Harness {
    harness_with(Settings::default(), Some(PEER), false)
}

fn text(value: &str) -> Vec<InputNode> {
    vec![InputNode::text(value)]
}

fn file(name: &str, mime: &str) -> FileSource {
    FileSource::new(name, mime, Vec::new())
}

async fn old_message(h: &Harness) -> Message {
    h.messages
        .get_message(OLD_MESSAGE)
        .await
        .expect("lookup")
        .expect("message")
}

#[tokio::test]
async fn enter_sends_text_and_resets_the_composer() {
    let h = harness();
    h.composer.handle_input(text("hello")).await;
    assert_eq!(h.composer.view().await.send_button, SendButton::Send);

    let disposition = h
        .composer
        .handle_key(KeyPress::new(Key::Enter))
        .await
        .expect("send");
    assert_eq!(disposition, EventDisposition::Consumed);

    assert_eq!(
        h.messages.all().await,
        vec![
            Call::Text {
                peer: PEER,
                text: "hello".into(),
                options: SendTextOptions::default(),
            },
            Call::ReadHistory {
                peer: PEER,
                up_to: TOP_MESSAGE,
            },
        ]
    );
    let view = h.composer.view().await;
    assert_eq!(view.input_text, "");
    assert_eq!(view.send_button, SendButton::Voice);
    assert_eq!(view.compose, ComposeState::default());
    assert_eq!(h.session.scrolls(), 1);
}

#[tokio::test]
async fn modified_enter_passes_through() {
    let h = harness();
    h.composer.handle_input(text("hello")).await;

    for press in [
        KeyPress::new(Key::Enter).with_shift(),
        KeyPress::new(Key::Enter).with_ctrl(),
        KeyPress::new(Key::Enter).with_meta(),
        KeyPress::new(Key::Other),
    ] {
        let disposition = h.composer.handle_key(press).await.expect("key");
        assert_eq!(disposition, EventDisposition::PassThrough);
    }
    assert!(h.messages.all().await.is_empty());
}

#[tokio::test]
async fn blank_input_switches_to_voice_and_cancels_typing() {
    let h = harness();
    let outcome = h.composer.handle_input(text("   ")).await;
    assert_eq!(outcome.typing, Some(TypingAction::Cancelled));
    assert_eq!(h.session.typing(), vec![TypingAction::Cancelled]);

    let view = h.composer.view().await;
    assert_eq!(view.send_button, SendButton::Voice);
    assert_eq!(view.input_text, "");

    h.composer.handle_input(vec![InputNode::emoji("👍")]).await;
    assert_eq!(h.composer.send_button().await, SendButton::Send);
    assert_eq!(h.composer.input_text().await, "👍");
}

#[tokio::test]
async fn blank_input_is_not_sent() {
    let h = harness();
    assert!(!h.composer.send_message().await.expect("send"));
    assert_eq!(
        h.composer.click_send_button().await.expect("click"),
        EventDisposition::PassThrough
    );
    assert!(h.messages.all().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_signals_inside_one_window_collapse() {
    let h = harness();
    h.composer.handle_input(text("a")).await;
    tokio::time::advance(Duration::from_millis(100)).await;
    let outcome = h.composer.handle_input(text("ab")).await;

    assert_eq!(outcome.typing, None);
    assert_eq!(h.session.typing(), vec![TypingAction::Typing]);
}

#[tokio::test(start_paused = true)]
async fn typing_signals_repeat_after_the_window() {
    let h = harness();
    h.composer.handle_input(text("a")).await;
    tokio::time::advance(Duration::from_millis(7000)).await;
    let outcome = h.composer.handle_input(text("ab")).await;

    assert_eq!(outcome.typing, Some(TypingAction::Typing));
    assert_eq!(
        h.session.typing(),
        vec![TypingAction::Typing, TypingAction::Typing]
    );
}

#[tokio::test]
async fn stale_web_page_response_is_discarded() {
    let h = harness();
    let lookup_a = h
        .composer
        .handle_input(text(&format!("see {URL_A}")))
        .await
        .lookup
        .expect("lookup for A");
    let lookup_b = h
        .composer
        .handle_input(text(&format!("see {URL_B}")))
        .await
        .lookup
        .expect("lookup for B");
    assert_eq!(lookup_a.url(), URL_A);

    assert!(!lookup_a.run().await.expect("lookup A"));
    let view = h.composer.view().await;
    assert_eq!(view.top_info, None);
    assert_eq!(view.compose.pending_webpage, None);
    assert_eq!(*h.cache.saved.lock().expect("cache"), vec![URL_A.to_string()]);

    assert!(lookup_b.run().await.expect("lookup B"));
    let view = h.composer.view().await;
    assert_eq!(
        view.top_info,
        Some(TopInfo {
            title: "B title".into(),
            subtitle: URL_B.into(),
        })
    );
}

#[tokio::test]
async fn unchanged_url_is_not_requested_again() {
    let h = harness();
    let first = h.composer.handle_input(text(&format!("x {URL_A}"))).await;
    assert!(first.lookup.is_some());

    let second = h.composer.handle_input(text(&format!("x {URL_A} y"))).await;
    assert!(second.lookup.is_none());
}

#[tokio::test]
async fn spawned_lookup_applies_preview_and_drops_reply() {
    let h = harness();
    let message = old_message(&h).await;
    h.composer.begin_reply(&message, "Alice").await;
    assert_eq!(h.composer.view().await.compose.reply_to, Some(OLD_MESSAGE));

    let lookup = h
        .composer
        .handle_input(text(&format!("look {URL_A}")))
        .await
        .lookup
        .expect("lookup");
    assert!(lookup.spawn().await.expect("join").expect("lookup"));

    let view = h.composer.view().await;
    assert_eq!(view.compose.reply_to, None);
    assert_eq!(
        view.top_info,
        Some(TopInfo {
            title: "A site".into(),
            subtitle: "About A".into(),
        })
    );

    h.composer.send_message().await.expect("send");
    let sends = h.messages.sends().await;
    let Call::Text { options, .. } = &sends[0] else {
        panic!("expected text send, got {sends:?}");
    };
    assert_eq!(options.reply_to, None);
    assert_eq!(
        options.webpage.as_ref().map(|page| page.url.as_str()),
        Some(URL_A)
    );
}

#[tokio::test]
async fn empty_web_page_leaves_banner_alone() {
    let h = harness();
    let lookup = h
        .composer
        .handle_input(text("https://empty.example.com"))
        .await
        .lookup
        .expect("lookup");
    assert!(!lookup.run().await.expect("lookup"));
    assert_eq!(h.composer.view().await.top_info, None);
}

#[tokio::test]
async fn failed_web_page_request_surfaces_rpc_error() {
    let h = harness();
    let lookup = h
        .composer
        .handle_input(text("https://unknown.example.com"))
        .await
        .lookup
        .expect("lookup");
    let err = lookup.run().await.expect_err("unknown page");
    let rpc = err.downcast_ref::<RpcError>().expect("rpc error");
    assert_eq!(rpc.code, RpcErrorCode::NotFound);
}

#[tokio::test]
async fn paste_inserts_wrapped_emoji_at_caret() {
    let h = harness();
    h.composer.handle_input(text("ab")).await;
    h.composer.set_caret(1).await;

    let outcome = h.composer.handle_paste("hi 😀").await;
    assert!(outcome.lookup.is_none());
    assert_eq!(h.composer.view().await.input_text, "abhi 😀");

    assert_eq!(
        h.composer.handle_copy(2..3).await,
        CopyOutcome::Override("😀".into())
    );
    assert_eq!(h.composer.handle_copy(1..1).await, CopyOutcome::Native);
}

#[tokio::test]
async fn native_emoji_leaves_copy_alone() {
    let h = harness_with(Settings::default(), Some(PEER), true);
    h.composer.handle_input(text("ab")).await;
    assert_eq!(h.composer.handle_copy(0..1).await, CopyOutcome::Native);
}

#[tokio::test]
async fn media_intent_filters_out_documents() {
    let h = harness();
    h.composer.select_attach_intent(AttachIntent::Media).await;
    let popup = h
        .composer
        .attach_files(vec![
            file("a.png", "image/png"),
            file("b.mp4", "video/mp4"),
            file("c.pdf", "application/pdf"),
        ])
        .await
        .expect("stage")
        .expect("popup");

    assert_eq!(popup.batch.len(), 2);
    assert_eq!(popup.title, "Send Album");
    assert_eq!(h.composer.view().await.attach_phase, AttachPhase::Staged);
}

#[tokio::test]
async fn caption_is_split_from_multiple_files() {
    let h = harness();
    let message = old_message(&h).await;
    h.composer.begin_reply(&message, "Alice").await;
    h.composer.select_attach_intent(AttachIntent::Media).await;
    h.composer
        .attach_files(vec![file("a.png", "image/png"), file("b.png", "image/png")])
        .await
        .expect("stage");
    assert_eq!(h.composer.preview_urls().live_count(), 2);
    h.composer.set_caption("hello").await;

    h.composer.send_attachments().await.expect("send");

    let file_options = |reply_to| SendFileOptions {
        is_media: true,
        caption: String::new(),
        reply_to,
        width: Some(100),
        height: Some(100),
        duration_seconds: None,
    };
    assert_eq!(
        h.messages.sends().await,
        vec![
            Call::Text {
                peer: PEER,
                text: "hello".into(),
                options: SendTextOptions {
                    reply_to: Some(OLD_MESSAGE),
                    ..SendTextOptions::default()
                },
            },
            Call::File {
                peer: PEER,
                name: "a.png".into(),
                options: file_options(None),
            },
            Call::File {
                peer: PEER,
                name: "b.png".into(),
                options: file_options(None),
            },
        ]
    );

    let view = h.composer.view().await;
    assert_eq!(view.attach_phase, AttachPhase::Idle);
    assert_eq!(view.popup, None);
    assert_eq!(view.compose.reply_to, None);
    assert_eq!(h.composer.preview_urls().live_count(), 0);
}

#[tokio::test]
async fn single_file_keeps_caption_and_reply() {
    let h = harness();
    let message = old_message(&h).await;
    h.composer.begin_reply(&message, "Alice").await;
    h.composer.select_attach_intent(AttachIntent::Document).await;
    h.composer
        .attach_files(vec![file("notes.pdf", "application/pdf")])
        .await
        .expect("stage");
    h.composer.set_caption("notes").await;

    h.composer.send_attachments().await.expect("send");

    assert_eq!(
        h.messages.sends().await,
        vec![Call::File {
            peer: PEER,
            name: "notes.pdf".into(),
            options: SendFileOptions {
                is_media: false,
                caption: "notes".into(),
                reply_to: Some(OLD_MESSAGE),
                ..SendFileOptions::default()
            },
        }]
    );
}

#[tokio::test]
async fn grouped_albums_send_once_with_caption() {
    let settings = Settings {
        group_media_albums: true,
        ..Settings::default()
    };
    let h = harness_with(settings, Some(PEER), false);
    h.composer.select_attach_intent(AttachIntent::Media).await;
    h.composer
        .attach_files(vec![file("a.png", "image/png"), file("b.mp4", "video/mp4")])
        .await
        .expect("stage");
    h.composer.set_caption("trip").await;

    h.composer.send_attachments().await.expect("send");

    assert_eq!(
        h.messages.sends().await,
        vec![Call::Album {
            peer: PEER,
            names: vec!["a.png".into(), "b.mp4".into()],
            options: SendAlbumOptions {
                caption: "trip".into(),
                reply_to: None,
            },
        }]
    );
}

#[tokio::test]
async fn sending_without_staged_batch_fails() {
    let h = harness();
    let err = h.composer.send_attachments().await.expect_err("idle");
    assert!(matches!(
        err.downcast_ref::<ComposerError>(),
        Some(ComposerError::AttachmentNotReady {
            phase: AttachPhase::Idle
        })
    ));
}

#[tokio::test]
async fn cancelling_the_popup_revokes_previews() {
    let h = harness();
    h.composer
        .attach_files(vec![file("a.png", "image/png")])
        .await
        .expect("stage");
    assert_eq!(h.composer.preview_urls().live_count(), 1);

    h.composer.cancel_attachments().await;
    assert_eq!(h.composer.preview_urls().live_count(), 0);
    assert_eq!(h.composer.attach_phase().await, AttachPhase::Idle);
    assert!(h.messages.all().await.is_empty());
}

#[tokio::test]
async fn document_paste_requires_active_peer() {
    let h = harness_with(Settings::default(), None, false);
    let disposition = h
        .composer
        .handle_document_paste(vec![ClipboardItem::File(file("a.png", "image/png"))])
        .await
        .expect("paste");
    assert_eq!(disposition, EventDisposition::PassThrough);
    assert_eq!(h.composer.view().await.attach_phase, AttachPhase::Idle);
}

#[tokio::test]
async fn document_paste_stages_files_once() {
    let h = harness();
    let text_only = h
        .composer
        .handle_document_paste(vec![ClipboardItem::Text("hi".into())])
        .await
        .expect("paste");
    assert_eq!(text_only, EventDisposition::PassThrough);

    let disposition = h
        .composer
        .handle_document_paste(vec![ClipboardItem::File(file("a.png", "image/png"))])
        .await
        .expect("paste");
    assert_eq!(disposition, EventDisposition::Consumed);

    let view = h.composer.view().await;
    assert_eq!(view.attach_phase, AttachPhase::Staged);
    let popup = view.popup.expect("popup");
    assert_eq!(popup.batch.kind, AttachIntent::Media);
    assert_eq!(popup.title, "Send Photo");

    let again = h
        .composer
        .handle_document_paste(vec![ClipboardItem::File(file("b.pdf", "application/pdf"))])
        .await
        .expect("paste");
    assert_eq!(again, EventDisposition::PassThrough);
}

#[tokio::test]
async fn pasted_non_image_is_staged_as_document() {
    let h = harness();
    h.composer
        .handle_document_paste(vec![ClipboardItem::File(file("b.mp4", "video/mp4"))])
        .await
        .expect("paste");
    let popup = h.composer.view().await.popup.expect("popup");
    assert_eq!(popup.batch.kind, AttachIntent::Document);
    assert_eq!(popup.title, "Send File");
}

#[tokio::test]
async fn edit_sends_edit_without_scrolling() {
    let h = harness();
    h.composer.begin_edit(OLD_MESSAGE).await.expect("edit");

    let view = h.composer.view().await;
    assert_eq!(view.input_text, "old text");
    assert_eq!(view.send_button, SendButton::Send);
    assert_eq!(view.top_info.expect("banner").title, "Editing");

    h.composer
        .handle_key(KeyPress::new(Key::Enter))
        .await
        .expect("send");
    assert_eq!(
        h.messages.sends().await,
        vec![Call::Edit {
            id: OLD_MESSAGE,
            text: "old text".into(),
            options: EditMessageOptions { no_webpage: false },
        }]
    );
    assert_eq!(h.session.scrolls(), 0);
    assert_eq!(h.composer.compose_state().await.edit_message, None);
    assert_eq!(h.composer.top_info().await, None);
}

#[tokio::test]
async fn cancelling_reply_abandons_plain_edit() {
    let h = harness();
    h.composer.begin_edit(OLD_MESSAGE).await.expect("edit");
    h.composer.cancel_reply().await.expect("cancel");

    let view = h.composer.view().await;
    assert_eq!(view.compose.edit_message, None);
    assert_eq!(view.input_text, "");
    assert_eq!(view.send_button, SendButton::Voice);
    assert_eq!(view.top_info, None);
    assert!(view.compose.no_webpage);
}

#[tokio::test]
async fn cancelling_preview_during_edit_restores_editing_banner() {
    let h = harness();
    h.composer.begin_edit(OLD_MESSAGE).await.expect("edit");
    let lookup = h
        .composer
        .handle_input(text(&format!("old text {URL_A}")))
        .await
        .lookup
        .expect("lookup");
    assert!(lookup.run().await.expect("lookup"));

    h.composer.cancel_reply().await.expect("cancel");

    let view = h.composer.view().await;
    assert_eq!(view.compose.edit_message, Some(OLD_MESSAGE));
    assert_eq!(view.compose.pending_webpage, None);
    assert!(view.compose.no_webpage);
    assert_eq!(
        view.top_info,
        Some(TopInfo {
            title: "Editing".into(),
            subtitle: "old text".into(),
        })
    );
}

#[tokio::test]
async fn editing_a_missing_message_fails() {
    let h = harness();
    let err = h
        .composer
        .begin_edit(MessageId(1234))
        .await
        .expect_err("missing");
    assert!(matches!(
        err.downcast_ref::<ComposerError>(),
        Some(ComposerError::MessageNotFound(1234))
    ));
}

#[tokio::test]
async fn externally_sent_message_clears_banner_and_input() {
    let h = harness();
    h.composer.set_top_info("Forward", "2 messages", Some("fwd")).await;
    assert_eq!(h.composer.input_text().await, "fwd");
    assert_eq!(h.composer.send_button().await, SendButton::Send);

    h.composer.on_message_sent(false, true).await.expect("sent");

    assert_eq!(h.composer.top_info().await, None);
    assert_eq!(h.composer.input_text().await, "");
    assert_eq!(h.session.scrolls(), 0);
    assert_eq!(
        h.messages.all().await,
        vec![Call::ReadHistory {
            peer: PEER,
            up_to: TOP_MESSAGE,
        }]
    );
}

#[tokio::test]
async fn cancelling_while_staging_keeps_the_popup_closed() {
    let probe = Arc::new(GatedProbe::default());
    let h = Arc::new(harness_with_probe(
        Settings::default(),
        Some(PEER),
        false,
        probe.clone(),
    ));
    let staging = tokio::spawn({
        let h = Arc::clone(&h);
        async move { h.composer.attach_files(vec![file("slow.png", "image/png")]).await }
    });

    probe.entered.notified().await;
    assert_eq!(h.composer.attach_phase().await, AttachPhase::PopupOpen);
    h.composer.cancel_attachments().await;
    probe.release.notify_one();

    let staged = staging.await.expect("join").expect("stage");
    assert_eq!(staged, None);
    let view = h.composer.view().await;
    assert_eq!(view.attach_phase, AttachPhase::Idle);
    assert_eq!(view.popup, None);
    assert_eq!(h.composer.preview_urls().live_count(), 0);
}

#[tokio::test]
async fn newer_attach_wins_over_slower_one() {
    let probe = Arc::new(GatedProbe::default());
    let h = Arc::new(harness_with_probe(
        Settings::default(),
        Some(PEER),
        false,
        probe.clone(),
    ));
    let slow = tokio::spawn({
        let h = Arc::clone(&h);
        async move { h.composer.attach_files(vec![file("slow.png", "image/png")]).await }
    });

    probe.entered.notified().await;
    let fast = h
        .composer
        .attach_files(vec![file("fast.png", "image/png")])
        .await
        .expect("stage")
        .expect("popup");
    assert_eq!(h.composer.preview_urls().live_count(), 2);

    probe.release.notify_one();
    assert_eq!(slow.await.expect("join").expect("stage"), None);

    let view = h.composer.view().await;
    assert_eq!(view.attach_phase, AttachPhase::Staged);
    assert_eq!(view.popup, Some(fast));
    assert_eq!(h.composer.preview_urls().live_count(), 1);
}
