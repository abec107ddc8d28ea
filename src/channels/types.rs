//! Transport-neutral message types.
//!
//! Inbound payloads are already decoded into canonical values; the session
//! layer never sees decorated button captions.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::keyboard::Keyboard;
use crate::error::ChannelError;
use crate::profile::{EditField, MediaId, UserId};

/// Main-menu and navigation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    FindPartner,
    ShowProfile,
    EditProfile,
    Edit(EditField),
    NextPartner,
    FollowPartner,
    BackToHome,
    SkipMobile,
}

impl MenuCommand {
    /// Commands available before onboarding completes.
    pub fn allowed_unregistered(&self) -> bool {
        matches!(self, Self::BackToHome | Self::SkipMobile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowDecision {
    Accept,
    Decline,
}

/// An uploaded photo, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_id: String,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Start,
    Command(MenuCommand),
    Text(String),
    Photo(PhotoUpload),
    FollowDecision {
        decision: FollowDecision,
        requester_id: UserId,
    },
}

/// One decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: UserId,
    /// Public handle of the sender, when the transport exposes one.
    pub username: Option<String>,
    pub payload: Inbound,
}

impl InboundEvent {
    pub fn new(sender: UserId, payload: Inbound) -> Self {
        Self {
            sender,
            username: None,
            payload,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Photo { media: MediaId, caption: String },
}

/// A render request for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipient: UserId,
    pub body: MessageBody,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingMessage {
    pub fn text(recipient: UserId, text: impl Into<String>) -> Self {
        Self {
            recipient,
            body: MessageBody::Text(text.into()),
            keyboard: None,
        }
    }

    pub fn photo(recipient: UserId, media: MediaId, caption: impl Into<String>) -> Self {
        Self {
            recipient,
            body: MessageBody::Photo {
                media,
                caption: caption.into(),
            },
            keyboard: None,
        }
    }

    /// Photo with caption when `media` is set, plain text otherwise.
    pub fn card(recipient: UserId, media: Option<MediaId>, text: impl Into<String>) -> Self {
        match media {
            Some(media) => Self::photo(recipient, media, text),
            None => Self::text(recipient, text),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    /// Text content, or the caption of a photo.
    pub fn text_content(&self) -> &str {
        match &self.body {
            MessageBody::Text(text) => text,
            MessageBody::Photo { caption, .. } => caption,
        }
    }
}

/// A downloaded upload.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub extension: Option<String>,
}

/// Stream of decoded inbound events.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A messaging transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    async fn send(&self, message: OutgoingMessage) -> Result<(), ChannelError>;

    /// Fetch the bytes of an uploaded photo.
    async fn download_photo(&self, file_id: &str) -> Result<DownloadedFile, ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
