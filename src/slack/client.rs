//! Chat gateway: the only egress from the coordinator to Slack.
//!
//! [`ChatGateway`] is the seam handlers and background loops talk to.
//! [`SlackService`] is the Web API implementation; [`NoopGateway`] stands
//! in when `slack.test_mode` is set and every primitive succeeds without
//! I/O.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiChatUpdateRequest, SlackApiConversationsInfoRequest,
    SlackApiToken, SlackApiTokenType, SlackApiTokenValue, SlackBlock, SlackChannelId, SlackClient,
    SlackClientHyperHttpsConnector, SlackMessageContent, SlackTs,
};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::SlackConfig;
use crate::errors::{classify_slack_code, ChatErrorKind};
use crate::slack::blocks;
use crate::{AppError, Result};

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Boxed future returned by every gateway primitive.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Coordinates of a posted root message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    /// Channel the message landed in.
    pub channel: String,
    /// Message timestamp; thread root and update key.
    pub ts: String,
}

/// Chat primitives the coordinator depends on.
///
/// Failures surface as [`AppError::Chat`] with a pre-computed
/// [`ChatErrorKind`], so callers can apply the channel-loss policy through
/// [`classify_error`](crate::errors::classify_error).
pub trait ChatGateway: Send + Sync {
    /// Post a root message, mentioning `mention` when given.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the post fails.
    fn post_message<'a>(
        &'a self,
        channel: &'a str,
        blocks: Vec<SlackBlock>,
        mention: Option<&'a str>,
    ) -> GatewayFuture<'a, PostedMessage>;

    /// Post a root message without any mention.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the post fails.
    fn post_off_hours<'a>(
        &'a self,
        channel: &'a str,
        blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, PostedMessage> {
        self.post_message(channel, blocks, None)
    }

    /// Replace the blocks of an existing message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the update fails.
    fn update_message<'a>(
        &'a self,
        channel: &'a str,
        ts: &'a str,
        blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, ()>;

    /// Reply in the thread rooted at `thread_ts`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` if the post fails.
    fn post_thread<'a>(
        &'a self,
        channel: &'a str,
        thread_ts: &'a str,
        blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, ()>;

    /// Whether the channel is archived. Unknown channels count as archived.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Chat` for failures other than channel loss.
    fn is_channel_archived<'a>(&'a self, channel: &'a str) -> GatewayFuture<'a, bool>;
}

/// Map a Slack client failure onto the gateway error model.
fn chat_error(op: &str, err: &SlackClientError) -> AppError {
    let kind = match err {
        SlackClientError::ApiError(api) => classify_slack_code(&api.code),
        SlackClientError::RateLimitError(_)
        | SlackClientError::HttpError(_)
        | SlackClientError::HttpProtocolError(_) => ChatErrorKind::Transient,
        _ => ChatErrorKind::Fatal,
    };
    AppError::chat(kind, format!("{op}: {err}"))
}

fn content(text: Option<String>, blocks: Vec<SlackBlock>) -> SlackMessageContent {
    let content = SlackMessageContent::new().with_blocks(blocks);
    match text {
        Some(text) => content.with_text(text),
        None => content,
    }
}

/// Slack Web API gateway with per-call timeouts and rate-limit retry.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
    request_timeout: Duration,
}

impl SlackService {
    /// Build the HTTPS client for the configured bot token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTPS connector cannot be created.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Config(format!("failed to init slack connector: {err}")))?;
        let bot_token = SlackApiToken::new(SlackApiTokenValue(config.bot_token.clone()))
            .with_token_type(SlackApiTokenType::Bot);

        info!(
            timeout_seconds = config.request_timeout_seconds,
            "slack gateway ready"
        );
        Ok(Self {
            client: Arc::new(SlackClient::new(connector)),
            bot_token,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    /// Run one API call with a timeout per attempt, retrying rate limits.
    async fn call<T, F, Fut>(&self, op: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, SlackClientError>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            let outcome = timeout(self.request_timeout, attempt()).await.map_err(|_| {
                AppError::chat(ChatErrorKind::Transient, format!("{op}: timed out"))
            })?;

            match outcome {
                Ok(value) => return Ok(value),
                Err(SlackClientError::RateLimitError(rate)) if tries < MAX_ATTEMPTS => {
                    let delay = rate.retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!(op, delay = ?delay, tries, "slack rate limited; retrying");
                    sleep(delay).await;
                }
                Err(err) => return Err(chat_error(op, &err)),
            }
        }
    }
}

impl ChatGateway for SlackService {
    fn post_message<'a>(
        &'a self,
        channel: &'a str,
        blocks: Vec<SlackBlock>,
        mention: Option<&'a str>,
    ) -> GatewayFuture<'a, PostedMessage> {
        Box::pin(async move {
            let mention = mention.map(str::trim).filter(|m| !m.is_empty());
            let mut body = Vec::with_capacity(blocks.len() + 1);
            if let Some(user) = mention {
                body.push(blocks::mention_section(user));
            }
            body.extend(blocks);
            let text = mention.map(|user| format!("<@{user}> review requested"));

            let request = SlackApiChatPostMessageRequest::new(
                SlackChannelId(channel.to_owned()),
                content(text, body),
            );
            let (client, token, req) = (&self.client, &self.bot_token, &request);
            let response = self
                .call("chat.postMessage", move || async move {
                    client.open_session(token).chat_post_message(req).await
                })
                .await?;

            debug!(channel, ts = %response.ts, "posted root message");
            Ok(PostedMessage {
                channel: response.channel.to_string(),
                ts: response.ts.to_string(),
            })
        })
    }

    fn update_message<'a>(
        &'a self,
        channel: &'a str,
        ts: &'a str,
        blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let request = SlackApiChatUpdateRequest::new(
                SlackChannelId(channel.to_owned()),
                content(None, blocks),
                SlackTs(ts.to_owned()),
            );
            let (client, token, req) = (&self.client, &self.bot_token, &request);
            self.call("chat.update", move || async move {
                client.open_session(token).chat_update(req).await
            })
            .await?;
            Ok(())
        })
    }

    fn post_thread<'a>(
        &'a self,
        channel: &'a str,
        thread_ts: &'a str,
        blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let request = SlackApiChatPostMessageRequest::new(
                SlackChannelId(channel.to_owned()),
                content(None, blocks),
            )
            .with_thread_ts(SlackTs(thread_ts.to_owned()));
            let (client, token, req) = (&self.client, &self.bot_token, &request);
            self.call("chat.postMessage", move || async move {
                client.open_session(token).chat_post_message(req).await
            })
            .await?;
            Ok(())
        })
    }

    fn is_channel_archived<'a>(&'a self, channel: &'a str) -> GatewayFuture<'a, bool> {
        Box::pin(async move {
            let request = SlackApiConversationsInfoRequest::new(SlackChannelId(channel.to_owned()));
            let (client, token, req) = (&self.client, &self.bot_token, &request);
            let result = self
                .call("conversations.info", move || async move {
                    client.open_session(token).conversations_info(req).await
                })
                .await;

            match result {
                Ok(response) => Ok(response.channel.flags.is_archived.unwrap_or(false)),
                Err(AppError::Chat {
                    kind: ChatErrorKind::ChannelRelated,
                    message,
                }) => {
                    debug!(channel, %message, "channel unreachable; treating as archived");
                    Ok(true)
                }
                Err(err) => Err(err),
            }
        })
    }
}

/// Gateway used in test mode: accepts everything, talks to nobody.
#[derive(Debug, Default)]
pub struct NoopGateway {
    seq: AtomicU64,
}

impl NoopGateway {
    /// Create a gateway whose fake timestamps start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatGateway for NoopGateway {
    fn post_message<'a>(
        &'a self,
        channel: &'a str,
        _blocks: Vec<SlackBlock>,
        _mention: Option<&'a str>,
    ) -> GatewayFuture<'a, PostedMessage> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        Box::pin(async move {
            Ok(PostedMessage {
                channel: channel.to_owned(),
                ts: format!("0000000000.{n:06}"),
            })
        })
    }

    fn update_message<'a>(
        &'a self,
        _channel: &'a str,
        _ts: &'a str,
        _blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn post_thread<'a>(
        &'a self,
        _channel: &'a str,
        _thread_ts: &'a str,
        _blocks: Vec<SlackBlock>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn is_channel_archived<'a>(&'a self, _channel: &'a str) -> GatewayFuture<'a, bool> {
        Box::pin(async { Ok(false) })
    }
}
