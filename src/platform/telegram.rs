//! Telegram Bot API backend.
//!
//! The Bot API has no call that reads a message by id, so looking up an
//! archived file forwards the archive message onto the archive channel itself,
//! reads the media off that copy and deletes it again. A lookup is therefore
//! not side-effect free: if the delete fails, or the session runtime is torn
//! down between the forward and the delete, the copy stays in the channel.
//! Both cases are logged with the copy's message id so it can be removed by
//! hand. The stored records never point at a copy.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileMeta, MessageId};
use teloxide::{ApiError, RequestError};

use super::{ArchivedMessage, Attachment, BotIdentity, ChatPlatform, InboundMessage, PlatformError};
use crate::config::PlatformConfig;
use crate::storage::models::MediaKind;

#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
    archive: ChatId,
    api_url: String,
    token: String,
}

impl TelegramPlatform {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let api_url = reqwest::Url::parse(&config.api_url)
            .map_err(|e| PlatformError::Request(format!("invalid Bot API URL: {e}")))?;

        let bot = Bot::new(config.bot_token.clone()).set_api_url(api_url);

        Ok(Self {
            bot,
            archive: ChatId(config.archive_channel_id),
            api_url: config.api_url.clone(),
            token: config.bot_token.clone(),
        })
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Convert a Telegram message into the platform-neutral form.
    pub fn inbound_message(msg: &Message) -> InboundMessage {
        InboundMessage {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
            sender_id: msg.from().map(|u| u.id.0),
            attachment: attachment_of(msg),
        }
    }
}

fn attachment_of(msg: &Message) -> Option<Attachment> {
    if let Some(doc) = msg.document() {
        return Some(attachment(
            MediaKind::Document,
            &doc.file,
            doc.file_name.clone(),
            doc.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    if let Some(video) = msg.video() {
        return Some(attachment(
            MediaKind::Video,
            &video.file,
            video.file_name.clone(),
            video.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    if let Some(audio) = msg.audio() {
        return Some(attachment(
            MediaKind::Audio,
            &audio.file,
            audio.file_name.clone(),
            audio.mime_type.as_ref().map(|m| m.to_string()),
        ));
    }
    None
}

fn attachment(
    kind: MediaKind,
    file: &FileMeta,
    file_name: Option<String>,
    mime_type: Option<String>,
) -> Attachment {
    Attachment {
        kind,
        unique_id: file.unique_id.clone(),
        file_ref: file.id.clone(),
        file_name,
        mime_type,
        byte_size: Some(u64::from(file.size)),
    }
}

/// True when the Bot API reports that the referenced message does not exist.
fn is_missing_message(err: &RequestError) -> bool {
    match err {
        RequestError::Api(ApiError::MessageToForwardNotFound) => true,
        RequestError::Api(ApiError::Unknown(description)) => {
            let lower = description.to_lowercase();
            lower.contains("message to forward not found") || lower.contains("message_id_invalid")
        }
        _ => false,
    }
}

/// Reports a lookup copy that was never cleaned up because the lookup was
/// cancelled mid-way.
struct EchoCleanup {
    archive_message_id: i32,
    echo_message_id: i32,
    done: bool,
}

impl EchoCleanup {
    fn finish(mut self) {
        self.done = true;
        drop(self);
    }
}

impl Drop for EchoCleanup {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!(
                archive_message_id = self.archive_message_id,
                echo_message_id = self.echo_message_id,
                "Lookup cancelled; copy left in archive channel"
            );
        }
    }
}

fn request_error(err: RequestError) -> PlatformError {
    PlatformError::Request(err.to_string())
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn connect(&self) -> Result<BotIdentity, PlatformError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| PlatformError::Auth(e.to_string()))?;

        self.bot
            .get_chat(self.archive)
            .await
            .map_err(|e| PlatformError::ArchiveChannel {
                channel_id: self.archive.0,
                reason: e.to_string(),
            })?;

        Ok(BotIdentity {
            username: me.user.username.clone().unwrap_or_default(),
        })
    }

    async fn forward_to_archive(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<ArchivedMessage, PlatformError> {
        let forwarded = self
            .bot
            .forward_message(self.archive, ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(request_error)?;

        Ok(ArchivedMessage {
            message_id: forwarded.id.0,
            media: attachment_of(&forwarded),
        })
    }

    async fn archived_media(
        &self,
        archive_message_id: i32,
    ) -> Result<Option<Attachment>, PlatformError> {
        // Silent copy within the archive channel; see the module docs.
        let echo = match self
            .bot
            .forward_message(self.archive, self.archive, MessageId(archive_message_id))
            .disable_notification(true)
            .await
        {
            Ok(echo) => echo,
            Err(e) if is_missing_message(&e) => return Ok(None),
            Err(e) => return Err(request_error(e)),
        };

        let media = attachment_of(&echo);

        let cleanup = EchoCleanup {
            archive_message_id,
            echo_message_id: echo.id.0,
            done: false,
        };
        let deleted = self.bot.delete_message(self.archive, echo.id).await;
        cleanup.finish();

        if let Err(e) = deleted {
            tracing::warn!(
                archive_message_id,
                echo_message_id = echo.id.0,
                error = %e,
                "Failed to remove lookup echo from archive channel"
            );
        }

        Ok(media)
    }

    async fn file_path(&self, file_ref: &str) -> Result<String, PlatformError> {
        let file = self
            .bot
            .get_file(file_ref.to_string())
            .await
            .map_err(request_error)?;
        Ok(file.path)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_url,
            self.token,
            file_path.trim_start_matches('/')
        )
    }
}
