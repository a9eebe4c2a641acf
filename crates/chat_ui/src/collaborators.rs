//! Application services the composer and banners call into.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{
        Dialog, EditMessageOptions, FileSource, Message, MessageId, PeerId, SendAlbumOptions,
        SendFileOptions, SendTextOptions, TypingAction, WebPagePreview,
    },
    protocol::ApiRequest,
};

use crate::attachments::MediaProbe;
use crate::rich_text::RichTextProcessor;

#[async_trait]
pub trait MessagesManager: Send + Sync {
    async fn send_text(&self, peer_id: PeerId, text: &str, options: SendTextOptions) -> Result<()>;
    async fn send_file(
        &self,
        peer_id: PeerId,
        file: &FileSource,
        options: SendFileOptions,
    ) -> Result<()>;
    async fn send_album(
        &self,
        peer_id: PeerId,
        files: &[FileSource],
        options: SendAlbumOptions,
    ) -> Result<()>;
    async fn edit_message(
        &self,
        message_id: MessageId,
        text: &str,
        options: EditMessageOptions,
    ) -> Result<()>;
    async fn get_message(&self, message_id: MessageId) -> Result<Option<Message>>;
    async fn get_dialog_by_peer_id(&self, peer_id: PeerId) -> Result<Option<Dialog>>;
    async fn read_history(&self, peer_id: PeerId, up_to: MessageId) -> Result<()>;
}

/// Generic remote procedure call.
#[async_trait]
pub trait ApiInvoker: Send + Sync {
    async fn invoke(&self, request: ApiRequest) -> Result<serde_json::Value>;
}

pub trait WebPageCache: Send + Sync {
    fn save_web_page(&self, page: &WebPagePreview);
}

/// The conversation currently shown.
pub trait ChatSession: Send + Sync {
    fn peer_id(&self) -> Option<PeerId>;
    fn set_typing(&self, action: TypingAction);
    fn scroll_to_bottom(&self);
}

#[derive(Clone)]
pub struct Collaborators {
    pub messages: Arc<dyn MessagesManager>,
    pub api: Arc<dyn ApiInvoker>,
    pub web_pages: Arc<dyn WebPageCache>,
    pub session: Arc<dyn ChatSession>,
    pub rich_text: Arc<dyn RichTextProcessor>,
    pub media_probe: Arc<dyn MediaProbe>,
}
