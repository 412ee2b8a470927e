use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rtb_core::{
    config::Config,
    poller::ResultPoller,
    ports::{NotificationSink, ResultSource},
    registry::TrackerRegistry,
};

use crate::commands;
use crate::TelegramNotifier;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub registry: Arc<TrackerRegistry>,
    pub notifier: Arc<TelegramNotifier>,
}

/// Run the bot: start the background poller and dispatch commands until the
/// Telegram long-polling loop ends.
pub async fn run_polling(
    cfg: Arc<Config>,
    registry: Arc<TrackerRegistry>,
    source: Arc<dyn ResultSource>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = me.username(), "rtb started"),
        Err(e) => error!(error = %e, "get_me failed (token invalid?)"),
    }
    info!(
        drivers = registry.len().await,
        interval_secs = cfg.poll_interval.as_secs(),
        "monitoring tracked drivers"
    );

    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let sink: Arc<dyn NotificationSink> = notifier.clone();
    let poller = Arc::new(ResultPoller::new(registry.clone(), source, sink));

    let cancel = CancellationToken::new();
    let poll_task = poller.spawn(cfg.poll_interval, cancel.clone());

    let state = Arc::new(AppState {
        cfg,
        registry,
        notifier,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(commands::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    let _ = poll_task.await;

    Ok(())
}
