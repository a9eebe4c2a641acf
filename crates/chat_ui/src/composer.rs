//! The message composer: text input, reply banner, and attachment popup.
//!
//! Each interaction source has one handler (`handle_key`, `handle_input`,
//! `handle_paste`, ...). Handlers mutate the composer state under a single
//! async mutex and call into [`Collaborators`]. URL previews are not fetched
//! inline: `handle_input` hands back a [`WebPageLookup`] the host runs or
//! spawns, and the lookup only applies its result while its URL is still the
//! one the input references.

use std::{ops::Range, sync::Arc};

use anyhow::{Context, Result};
use serde::Serialize;
use shared::{
    domain::{
        EditMessageOptions, EntityKind, FileSource, Message, MessageId, PeerId,
        SendAlbumOptions, SendFileOptions, SendTextOptions, TypingAction, WebPagePreview,
    },
    protocol::ApiRequest,
};
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, info};

use crate::attachments::{
    effective_mime, is_image, AttachIntent, AttachmentBatch, AttachmentStager, PreviewUrls,
    StagedPopup,
};
use crate::collaborators::{ApiInvoker, Collaborators, WebPageCache};
use crate::config::Settings;
use crate::error::ComposerError;
use crate::input::{InputBuffer, InputNode};
use crate::typing::TypingThrottle;
use crate::EventDisposition;

const EDITING_TITLE: &str = "Editing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendButton {
    Send,
    Voice,
}

impl SendButton {
    pub fn icon_class(self) -> &'static str {
        match self {
            SendButton::Send => "tgico-send",
            SendButton::Voice => "tgico-microphone2",
        }
    }
}

/// Content of the reply/preview banner above the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopInfo {
    pub title: String,
    pub subtitle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComposeState {
    pub reply_to: Option<MessageId>,
    pub edit_message: Option<MessageId>,
    pub no_webpage: bool,
    pub pending_webpage: Option<WebPagePreview>,
    /// URL of the most recent preview request; only its response is honoured.
    pub last_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachPhase {
    Idle,
    PopupOpen,
    Staged,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub shift: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl KeyPress {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            shift: false,
            ctrl: false,
            meta: false,
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    fn has_modifier(&self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardItem {
    Text(String),
    File(FileSource),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Leave the clipboard to the platform.
    Native,
    Override(String),
}

#[derive(Debug, Default)]
pub struct InputOutcome {
    pub lookup: Option<WebPageLookup>,
    pub typing: Option<TypingAction>,
}

/// Snapshot of everything the host renders for the composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposerView {
    pub input_text: String,
    pub send_button: SendButton,
    pub top_info: Option<TopInfo>,
    pub compose: ComposeState,
    pub attach_phase: AttachPhase,
    pub popup: Option<StagedPopup>,
    pub caption: String,
}

struct AttachmentSession {
    intent: AttachIntent,
    phase: AttachPhase,
    popup: Option<StagedPopup>,
    caption: String,
    /// Bumped whenever a popup session starts or is cancelled; staging
    /// results from an older generation are discarded.
    generation: u64,
}

struct ComposerState {
    input: InputBuffer,
    send_button: SendButton,
    top_info: Option<TopInfo>,
    compose: ComposeState,
    typing: TypingThrottle,
    attach: AttachmentSession,
}

impl ComposerState {
    fn reset_input(&mut self) {
        self.input.clear();
        self.send_button = SendButton::Voice;
    }
}

/// A pending `messages.getWebPage` request for one URL.
pub struct WebPageLookup {
    url: String,
    api: Arc<dyn ApiInvoker>,
    web_pages: Arc<dyn WebPageCache>,
    state: Arc<Mutex<ComposerState>>,
}

impl std::fmt::Debug for WebPageLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebPageLookup").field("url", &self.url).finish()
    }
}

impl WebPageLookup {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetches the preview and applies it if the input still references this
    /// URL. Returns whether the banner was updated.
    pub async fn run(self) -> Result<bool> {
        let response = self
            .api
            .invoke(ApiRequest::GetWebPage {
                url: self.url.clone(),
                hash: 0,
            })
            .await
            .with_context(|| format!("web page request failed for {}", self.url))?;
        if response.is_null() {
            debug!(url = %self.url, "no web page preview available");
            return Ok(false);
        }

        let page: WebPagePreview =
            serde_json::from_value(response).context("malformed web page response")?;
        self.web_pages.save_web_page(&page);

        let mut state = self.state.lock().await;
        if state.compose.last_url != self.url {
            debug!(url = %self.url, current = %state.compose.last_url, "discarding stale web page");
            return Ok(false);
        }

        state.top_info = Some(TopInfo {
            title: page.banner_title().to_string(),
            subtitle: page.banner_subtitle().to_string(),
        });
        state.compose.reply_to = None;
        state.compose.no_webpage = false;
        state.compose.pending_webpage = Some(page);
        Ok(true)
    }

    pub fn spawn(self) -> JoinHandle<Result<bool>> {
        tokio::spawn(self.run())
    }
}

pub struct Composer {
    settings: Settings,
    collaborators: Collaborators,
    stager: AttachmentStager,
    urls: PreviewUrls,
    state: Arc<Mutex<ComposerState>>,
}

impl Composer {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        let urls = PreviewUrls::default();
        let stager = AttachmentStager::new(
            Arc::clone(&collaborators.media_probe),
            urls.clone(),
            settings.album_params(),
            settings.single_media_box(),
        );
        let state = ComposerState {
            input: InputBuffer::new(),
            send_button: SendButton::Voice,
            top_info: None,
            compose: ComposeState::default(),
            typing: TypingThrottle::new(settings.typing_window()),
            attach: AttachmentSession {
                intent: AttachIntent::Media,
                phase: AttachPhase::Idle,
                popup: None,
                caption: String::new(),
                generation: 0,
            },
        };

        Self {
            settings,
            collaborators,
            stager,
            urls,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn preview_urls(&self) -> &PreviewUrls {
        &self.urls
    }

    pub async fn view(&self) -> ComposerView {
        let state = self.state.lock().await;
        ComposerView {
            input_text: state.input.serialize(),
            send_button: state.send_button,
            top_info: state.top_info.clone(),
            compose: state.compose.clone(),
            attach_phase: state.attach.phase,
            popup: state.attach.popup.clone(),
            caption: state.attach.caption.clone(),
        }
    }

    pub async fn send_button(&self) -> SendButton {
        self.state.lock().await.send_button
    }

    pub async fn top_info(&self) -> Option<TopInfo> {
        self.state.lock().await.top_info.clone()
    }

    pub async fn compose_state(&self) -> ComposeState {
        self.state.lock().await.compose.clone()
    }

    pub async fn attach_phase(&self) -> AttachPhase {
        self.state.lock().await.attach.phase
    }

    pub async fn input_text(&self) -> String {
        self.state.lock().await.input.serialize()
    }

    pub async fn handle_key(&self, press: KeyPress) -> Result<EventDisposition> {
        if press.key != Key::Enter || press.has_modifier() {
            return Ok(EventDisposition::PassThrough);
        }
        self.send_message().await?;
        Ok(EventDisposition::Consumed)
    }

    /// The input content changed to `nodes`.
    pub async fn handle_input(&self, nodes: Vec<InputNode>) -> InputOutcome {
        let mut state = self.state.lock().await;
        state.input.replace(nodes);
        self.process_input(&mut state)
    }

    /// Inserts clipboard text at the caret. Always replaces the default paste.
    pub async fn handle_paste(&self, text: &str) -> InputOutcome {
        let nodes = self.collaborators.rich_text.wrap_emoji_text(text);
        let mut state = self.state.lock().await;
        state.input.insert_at_caret(nodes);
        self.process_input(&mut state)
    }

    pub async fn set_caret(&self, caret: usize) {
        self.state.lock().await.input.set_caret(caret);
    }

    /// Copying a node range keeps emoji aliases when emoji render as images.
    pub async fn handle_copy(&self, selection: Range<usize>) -> CopyOutcome {
        if self.collaborators.rich_text.emoji_supported() || selection.is_empty() {
            return CopyOutcome::Native;
        }
        let state = self.state.lock().await;
        CopyOutcome::Override(state.input.serialize_range(selection))
    }

    fn process_input(&self, state: &mut ComposerState) -> InputOutcome {
        let mut outcome = InputOutcome::default();
        let value = state.input.plain_text();
        let entities = self.collaborators.rich_text.parse_entities(&value);

        if let Some(entity) = entities.iter().find(|entity| entity.kind == EntityKind::Url) {
            let url = entity.slice(&value).to_string();
            if state.compose.last_url != url {
                debug!(%url, "requesting web page preview");
                state.compose.last_url = url.clone();
                state.compose.pending_webpage = None;
                outcome.lookup = Some(WebPageLookup {
                    url,
                    api: Arc::clone(&self.collaborators.api),
                    web_pages: Arc::clone(&self.collaborators.web_pages),
                    state: Arc::clone(&self.state),
                });
            }
        }

        if state.input.is_blank() {
            state.reset_input();
            self.collaborators.session.set_typing(TypingAction::Cancelled);
            outcome.typing = Some(TypingAction::Cancelled);
        } else {
            state.send_button = SendButton::Send;
            if state.typing.should_signal(Instant::now()) {
                self.collaborators.session.set_typing(TypingAction::Typing);
                outcome.typing = Some(TypingAction::Typing);
            }
        }

        outcome
    }

    pub async fn click_send_button(&self) -> Result<EventDisposition> {
        let button = self.state.lock().await.send_button;
        if button != SendButton::Send {
            return Ok(EventDisposition::PassThrough);
        }
        self.send_message().await?;
        Ok(EventDisposition::Consumed)
    }

    /// Sends the input as a new message, or as the edit in progress. Returns
    /// false when there was nothing to send.
    pub async fn send_message(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.input.is_blank() {
            return Ok(false);
        }
        let text = state.input.serialize();
        let messages = &self.collaborators.messages;

        let is_edit = match state.compose.edit_message {
            Some(message_id) => {
                messages
                    .edit_message(
                        message_id,
                        &text,
                        EditMessageOptions {
                            no_webpage: state.compose.no_webpage,
                        },
                    )
                    .await?;
                info!(message_id = message_id.0, "message edited");
                true
            }
            None => {
                let peer_id = self.active_peer()?;
                messages
                    .send_text(
                        peer_id,
                        &text,
                        SendTextOptions {
                            reply_to: state.compose.reply_to,
                            no_webpage: state.compose.no_webpage,
                            webpage: state.compose.pending_webpage.clone(),
                        },
                    )
                    .await?;
                info!(peer_id = peer_id.0, "text message sent");
                false
            }
        };

        self.after_send(&mut state, !is_edit, true).await?;
        Ok(true)
    }

    pub async fn on_message_sent(&self, scroll_down: bool, clear_input: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        self.after_send(&mut state, scroll_down, clear_input).await
    }

    async fn after_send(
        &self,
        state: &mut ComposerState,
        scroll_down: bool,
        clear_input: bool,
    ) -> Result<()> {
        let session = &self.collaborators.session;
        if scroll_down {
            session.scroll_to_bottom();
        }

        if let Some(peer_id) = session.peer_id() {
            let messages = &self.collaborators.messages;
            let dialog = messages.get_dialog_by_peer_id(peer_id).await?;
            if let Some(top_message) = dialog.and_then(|dialog| dialog.top_message) {
                messages.read_history(peer_id, top_message).await?;
            }
        }

        if clear_input {
            state.compose = ComposeState::default();
            state.top_info = None;
            state.typing.reset();
            state.reset_input();
        }
        Ok(())
    }

    /// Shows the banner; `input` replaces the message text when given.
    pub async fn set_top_info(&self, title: &str, subtitle: &str, input: Option<&str>) {
        let mut state = self.state.lock().await;
        self.apply_top_info(&mut state, title, subtitle, input);
    }

    fn apply_top_info(
        &self,
        state: &mut ComposerState,
        title: &str,
        subtitle: &str,
        input: Option<&str>,
    ) {
        state.top_info = Some(TopInfo {
            title: title.to_string(),
            subtitle: subtitle.to_string(),
        });

        if let Some(input) = input {
            let nodes = if input.is_empty() {
                Vec::new()
            } else {
                self.collaborators.rich_text.wrap_rich_text(input)
            };
            state.input.replace(nodes);
            state.send_button = SendButton::Send;
        }
    }

    pub async fn begin_reply(&self, message: &Message, title: &str) {
        let mut state = self.state.lock().await;
        state.compose.reply_to = Some(message.id);
        self.apply_top_info(&mut state, title, &message.text, None);
    }

    pub async fn begin_edit(&self, message_id: MessageId) -> Result<()> {
        let message = self
            .collaborators
            .messages
            .get_message(message_id)
            .await?
            .ok_or(ComposerError::MessageNotFound(message_id.0))?;

        let mut state = self.state.lock().await;
        state.compose.edit_message = Some(message_id);
        self.apply_top_info(
            &mut state,
            EDITING_TITLE,
            &message.text,
            Some(message.text.as_str()),
        );
        Ok(())
    }

    /// Reply banner close button.
    pub async fn cancel_reply(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.top_info = None;
        state.compose.reply_to = None;

        if let Some(message_id) = state.compose.edit_message {
            if state.compose.pending_webpage.is_some() {
                let message = self
                    .collaborators
                    .messages
                    .get_message(message_id)
                    .await?
                    .ok_or(ComposerError::MessageNotFound(message_id.0))?;
                self.apply_top_info(&mut state, EDITING_TITLE, &message.text, None);
            } else {
                state.compose.edit_message = None;
                state.reset_input();
            }
        }

        state.compose.no_webpage = true;
        state.compose.pending_webpage = None;
        Ok(())
    }

    /// Attach menu choice; the host opens its file picker afterwards.
    pub async fn select_attach_intent(&self, intent: AttachIntent) {
        self.state.lock().await.attach.intent = intent;
    }

    /// Stages `files` for the current attach intent and opens the popup.
    /// Returns `None` when no file fits the intent.
    pub async fn attach_files(&self, files: Vec<FileSource>) -> Result<Option<StagedPopup>> {
        let (intent, generation) = {
            let mut state = self.state.lock().await;
            let attach = &mut state.attach;
            attach.caption.clear();
            if let Some(mut previous) = attach.popup.take() {
                previous.batch.clear(&self.urls);
            }
            attach.phase = AttachPhase::PopupOpen;
            attach.generation += 1;
            (attach.intent, attach.generation)
        };

        let staged = self.stager.stage(intent, files).await;

        let mut state = self.state.lock().await;
        if state.attach.generation != generation {
            debug!(
                generation,
                current = state.attach.generation,
                "discarding superseded attachment staging"
            );
            return match staged {
                Ok(Some(mut popup)) => {
                    popup.batch.clear(&self.urls);
                    Ok(None)
                }
                Ok(None) => Ok(None),
                Err(err) => Err(err),
            };
        }
        match staged {
            Ok(Some(popup)) => {
                state.attach.phase = AttachPhase::Staged;
                state.attach.popup = Some(popup.clone());
                Ok(Some(popup))
            }
            Ok(None) => {
                state.attach.phase = AttachPhase::Idle;
                Ok(None)
            }
            Err(err) => {
                state.attach.phase = AttachPhase::Idle;
                Err(err)
            }
        }
    }

    /// Document-level paste. Files are staged only while a conversation is
    /// open and no attach popup is showing.
    pub async fn handle_document_paste(
        &self,
        items: Vec<ClipboardItem>,
    ) -> Result<EventDisposition> {
        let files: Vec<FileSource> = items
            .into_iter()
            .filter_map(|item| match item {
                ClipboardItem::File(file) => Some(file),
                ClipboardItem::Text(_) => None,
            })
            .collect();
        if files.is_empty() || self.collaborators.session.peer_id().is_none() {
            return Ok(EventDisposition::PassThrough);
        }

        {
            let mut state = self.state.lock().await;
            if state.attach.phase != AttachPhase::Idle {
                return Ok(EventDisposition::PassThrough);
            }
            let all_images = files.iter().all(|file| is_image(&effective_mime(file)));
            state.attach.intent = if all_images {
                AttachIntent::Media
            } else {
                AttachIntent::Document
            };
        }

        self.attach_files(files).await?;
        Ok(EventDisposition::Consumed)
    }

    pub async fn set_caption(&self, caption: &str) {
        self.state.lock().await.attach.caption = caption.to_string();
    }

    /// Closes the popup without sending.
    pub async fn cancel_attachments(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut popup) = state.attach.popup.take() {
            popup.batch.clear(&self.urls);
        }
        state.attach.caption.clear();
        state.attach.phase = AttachPhase::Idle;
        state.attach.generation += 1;
    }

    pub async fn send_attachments(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.attach.phase != AttachPhase::Staged {
            return Err(ComposerError::AttachmentNotReady {
                phase: state.attach.phase,
            }
            .into());
        }
        let peer_id = self.active_peer()?;
        let Some(popup) = state.attach.popup.take() else {
            state.attach.phase = AttachPhase::Idle;
            return Err(ComposerError::NothingStaged.into());
        };

        state.attach.phase = AttachPhase::Sending;
        let caption = std::mem::take(&mut state.attach.caption);
        let mut batch = popup.batch;
        let dispatched = self
            .dispatch_batch(peer_id, &batch, caption, &mut state.compose.reply_to)
            .await;

        batch.clear(&self.urls);
        state.attach.phase = AttachPhase::Idle;
        dispatched?;

        self.after_send(&mut state, true, true).await
    }

    async fn dispatch_batch(
        &self,
        peer_id: PeerId,
        batch: &AttachmentBatch,
        mut caption: String,
        reply_to: &mut Option<MessageId>,
    ) -> Result<()> {
        let messages = &self.collaborators.messages;
        info!(
            peer_id = peer_id.0,
            count = batch.len(),
            media = batch.is_media(),
            "sending attachments"
        );

        if batch.is_media() && batch.len() > 1 && self.settings.group_media_albums {
            let files: Vec<FileSource> = batch.items.iter().map(|item| item.source.clone()).collect();
            return messages
                .send_album(
                    peer_id,
                    &files,
                    SendAlbumOptions {
                        caption,
                        reply_to: reply_to.take(),
                    },
                )
                .await;
        }

        if !caption.is_empty() && batch.len() > 1 {
            messages
                .send_text(
                    peer_id,
                    &caption,
                    SendTextOptions {
                        reply_to: reply_to.take(),
                        ..SendTextOptions::default()
                    },
                )
                .await?;
            caption.clear();
        }

        for item in &batch.items {
            messages
                .send_file(
                    peer_id,
                    &item.source,
                    SendFileOptions {
                        is_media: batch.is_media(),
                        caption: std::mem::take(&mut caption),
                        reply_to: reply_to.take(),
                        width: item.width,
                        height: item.height,
                        duration_seconds: item.duration_seconds,
                    },
                )
                .await?;
        }
        Ok(())
    }

    fn active_peer(&self) -> Result<PeerId> {
        Ok(self
            .collaborators
            .session
            .peer_id()
            .ok_or(ComposerError::NoActivePeer)?)
    }
}

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod tests;
