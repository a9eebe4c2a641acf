use thiserror::Error;

use crate::composer::AttachPhase;

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("no conversation is active")]
    NoActivePeer,
    #[error("no attachments are staged")]
    NothingStaged,
    #[error("attachments are not ready to send (phase {phase:?})")]
    AttachmentNotReady { phase: AttachPhase },
    #[error("could not read media metadata for '{name}': {reason}")]
    MetadataUnavailable { name: String, reason: String },
    #[error("message {0} was not found")]
    MessageNotFound(i64),
}
