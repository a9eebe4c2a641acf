//! Attachment staging: classification, metadata extraction, and popup layout.

use std::{
    collections::HashSet,
    io::Cursor,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use shared::domain::FileSource;
use tracing::{debug, info};
use uuid::Uuid;

use crate::album_layout::{container_size, layout_album, AlbumItemLayout, AlbumLayoutParams};
use crate::error::ComposerError;
use crate::media_sizes::MediaSize;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachIntent {
    Media,
    Document,
}

impl AttachIntent {
    /// Intent for a file pasted without an explicit menu choice.
    pub fn for_mime(mime: &str) -> Self {
        if is_image(mime) {
            AttachIntent::Media
        } else {
            AttachIntent::Document
        }
    }
}

pub fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

pub fn is_video(mime: &str) -> bool {
    mime.starts_with("video/")
}

/// Declared MIME type, or one guessed from the file name.
pub fn effective_mime(file: &FileSource) -> String {
    if !file.mime_type.trim().is_empty() {
        return file.mime_type.trim().to_ascii_lowercase();
    }
    mime_guess::from_path(&file.name)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

/// Media batches keep only images and videos; document batches keep all.
pub fn filter_for_intent(intent: AttachIntent, files: Vec<FileSource>) -> Vec<FileSource> {
    match intent {
        AttachIntent::Document => files,
        AttachIntent::Media => files
            .into_iter()
            .filter(|file| {
                let mime = effective_mime(file);
                is_image(&mime) || is_video(&mime)
            })
            .collect(),
    }
}

fn counted(count: usize, singular: &str, plural: &str) -> String {
    if count > 1 {
        format!("Send {count} {plural}")
    } else {
        format!("Send {singular}")
    }
}

pub fn popup_title(intent: AttachIntent, files: &[FileSource]) -> Option<String> {
    if files.is_empty() {
        return None;
    }

    match intent {
        AttachIntent::Document => Some(counted(files.len(), "File", "Files")),
        AttachIntent::Media => {
            let (photos, videos) = files.iter().fold((0, 0), |(photos, videos), file| {
                let mime = effective_mime(file);
                if is_image(&mime) {
                    (photos + 1, videos)
                } else if is_video(&mime) {
                    (photos, videos + 1)
                } else {
                    (photos, videos)
                }
            });

            match (photos, videos) {
                (0, 0) => None,
                (p, v) if p > 0 && v > 0 => Some("Send Album".to_string()),
                (p, 0) => Some(counted(p, "Photo", "Photos")),
                (_, v) => Some(counted(v, "Video", "Videos")),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaMetadata {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: Option<u32>,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe_image(&self, file: &FileSource) -> Result<MediaMetadata>;
    async fn probe_video(&self, file: &FileSource) -> Result<MediaMetadata>;
}

/// Reads image dimensions from the encoded header. Video probing is delegated
/// to `video` when present.
#[derive(Default)]
pub struct ImageHeaderProbe {
    video: Option<Arc<dyn MediaProbe>>,
}

impl ImageHeaderProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video_probe(video: Arc<dyn MediaProbe>) -> Self {
        Self { video: Some(video) }
    }
}

#[async_trait]
impl MediaProbe for ImageHeaderProbe {
    async fn probe_image(&self, file: &FileSource) -> Result<MediaMetadata> {
        let unavailable = |reason: String| ComposerError::MetadataUnavailable {
            name: file.name.clone(),
            reason,
        };
        let (width, height) = image::ImageReader::new(Cursor::new(&file.bytes))
            .with_guessed_format()
            .map_err(|err| unavailable(err.to_string()))?
            .into_dimensions()
            .map_err(|err| unavailable(err.to_string()))?;

        Ok(MediaMetadata {
            width,
            height,
            duration_seconds: None,
        })
    }

    async fn probe_video(&self, file: &FileSource) -> Result<MediaMetadata> {
        match &self.video {
            Some(video) => video.probe_video(file).await,
            None => Err(ComposerError::MetadataUnavailable {
                name: file.name.clone(),
                reason: "no video probe configured".into(),
            }
            .into()),
        }
    }
}

/// Issues preview URLs for staged media and tracks which are still live.
#[derive(Clone, Default)]
pub struct PreviewUrls {
    live: Arc<Mutex<HashSet<String>>>,
}

impl PreviewUrls {
    pub fn create(&self) -> String {
        let url = format!("blob:chat-ui/{}", Uuid::new_v4());
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone());
        url
    }

    pub fn revoke(&self, url: &str) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedAttachment {
    pub source: FileSource,
    pub mime_type: String,
    pub preview_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<u32>,
}

impl StagedAttachment {
    fn apply(&mut self, metadata: MediaMetadata) {
        self.width = Some(metadata.width);
        self.height = Some(metadata.height);
        self.duration_seconds = metadata.duration_seconds;
    }

    fn media_size(&self) -> MediaSize {
        MediaSize::new(
            f64::from(self.width.unwrap_or_default()),
            f64::from(self.height.unwrap_or_default()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentBatch {
    pub kind: AttachIntent,
    pub is_album: bool,
    pub items: Vec<StagedAttachment>,
}

impl AttachmentBatch {
    pub fn is_media(&self) -> bool {
        self.kind == AttachIntent::Media
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every item and revokes its preview URL.
    pub fn clear(&mut self, urls: &PreviewUrls) {
        for item in self.items.drain(..) {
            if let Some(url) = item.preview_url.as_deref() {
                urls.revoke(url);
            }
        }
        self.is_album = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPreviewKind {
    Photo,
    Doc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentEntry {
    pub name: String,
    pub size: u64,
    pub kind: DocumentPreviewKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PopupLayout {
    Album {
        items: Vec<AlbumItemLayout>,
        width: u32,
        height: u32,
    },
    Single {
        width: u32,
        height: u32,
    },
    Documents {
        entries: Vec<DocumentEntry>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedPopup {
    pub title: String,
    pub batch: AttachmentBatch,
    pub layout: PopupLayout,
}

impl StagedPopup {
    /// State classes on the popup body.
    pub fn classes(&self) -> Vec<&'static str> {
        let mut classes = vec![match self.batch.kind {
            AttachIntent::Media => "is-media",
            AttachIntent::Document => "is-document",
        }];
        if self.batch.is_album {
            classes.push("is-album");
        }
        classes
    }
}

pub struct AttachmentStager {
    probe: Arc<dyn MediaProbe>,
    urls: PreviewUrls,
    album: AlbumLayoutParams,
    single_box: MediaSize,
}

impl AttachmentStager {
    pub fn new(
        probe: Arc<dyn MediaProbe>,
        urls: PreviewUrls,
        album: AlbumLayoutParams,
        single_box: MediaSize,
    ) -> Self {
        Self {
            probe,
            urls,
            album,
            single_box,
        }
    }

    /// Filters `files` for `intent`, extracts metadata for every media file
    /// concurrently and computes the popup layout. Returns `None` when no file
    /// survives filtering.
    pub async fn stage(
        &self,
        intent: AttachIntent,
        files: Vec<FileSource>,
    ) -> Result<Option<StagedPopup>> {
        let files = filter_for_intent(intent, files);
        let Some(title) = popup_title(intent, &files) else {
            return Ok(None);
        };

        let pending: Vec<StagedAttachment> = files
            .into_iter()
            .map(|source| {
                let mime_type = effective_mime(&source);
                let preview_url = (intent == AttachIntent::Media).then(|| self.urls.create());
                StagedAttachment {
                    source,
                    mime_type,
                    preview_url,
                    width: None,
                    height: None,
                    duration_seconds: None,
                }
            })
            .collect();
        let preview_urls: Vec<String> = pending
            .iter()
            .filter_map(|item| item.preview_url.clone())
            .collect();

        let items = match try_join_all(pending.into_iter().map(|item| self.resolve(intent, item))).await {
            Ok(items) => items,
            Err(err) => {
                for url in &preview_urls {
                    self.urls.revoke(url);
                }
                return Err(err);
            }
        };

        let batch = AttachmentBatch {
            kind: intent,
            is_album: intent == AttachIntent::Media && items.len() > 1,
            items,
        };
        let layout = self.layout(&batch);
        info!(
            kind = ?batch.kind,
            count = batch.len(),
            album = batch.is_album,
            "attachments staged"
        );

        Ok(Some(StagedPopup {
            title,
            batch,
            layout,
        }))
    }

    async fn resolve(
        &self,
        intent: AttachIntent,
        mut item: StagedAttachment,
    ) -> Result<StagedAttachment> {
        if intent == AttachIntent::Document {
            return Ok(item);
        }

        let probed = if is_video(&item.mime_type) {
            self.probe.probe_video(&item.source).await
        } else {
            self.probe.probe_image(&item.source).await
        };
        let metadata =
            probed.with_context(|| format!("failed to stage '{}'", item.source.name))?;

        debug!(
            name = %item.source.name,
            width = metadata.width,
            height = metadata.height,
            "media metadata extracted"
        );
        item.apply(metadata);
        Ok(item)
    }

    fn layout(&self, batch: &AttachmentBatch) -> PopupLayout {
        if !batch.is_media() {
            let entries = batch
                .items
                .iter()
                .map(|item| DocumentEntry {
                    name: item.source.name.clone(),
                    size: item.source.size(),
                    kind: if item.mime_type.contains("image/") {
                        DocumentPreviewKind::Photo
                    } else {
                        DocumentPreviewKind::Doc
                    },
                })
                .collect();
            return PopupLayout::Documents { entries };
        }

        if batch.is_album {
            let sizes: Vec<MediaSize> = batch.items.iter().map(StagedAttachment::media_size).collect();
            let items = layout_album(&sizes, &self.album);
            let (width, height) = container_size(&items);
            return PopupLayout::Album {
                items,
                width,
                height,
            };
        }

        let fitted = batch
            .items
            .first()
            .map(StagedAttachment::media_size)
            .unwrap_or(self.single_box)
            .aspect_covered(self.single_box);
        PopupLayout::Single {
            width: fitted.width.round() as u32,
            height: fitted.height.round() as u32,
        }
    }
}

#[cfg(test)]
#[path = "tests/attachments_tests.rs"]
mod tests;
