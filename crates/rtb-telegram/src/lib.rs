//! Telegram adapter (teloxide).
//!
//! Implements the `rtb-core` NotificationSink port over the Telegram Bot API
//! and hosts the command surface + dispatcher.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode};

use tokio::time::sleep;

pub mod commands;
pub mod router;

use rtb_core::{
    domain::{ChannelId, RaceReport},
    errors::Error,
    formatting::format_race_report,
    ports::NotificationSink,
    Result,
};

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(channel: ChannelId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(channel.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Delivery(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    pub async fn send_html(&self, channel: ChannelId, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(channel), html.to_string())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn resolve_channel(&self, channel: ChannelId) -> bool {
        self.bot.get_chat(Self::tg_chat(channel)).await.is_ok()
    }

    async fn deliver(
        &self,
        channel: ChannelId,
        display_name: &str,
        report: &RaceReport,
    ) -> Result<()> {
        let html = format_race_report(display_name, report);
        self.send_html(channel, &html).await
    }
}
