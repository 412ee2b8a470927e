use async_trait::async_trait;

use crate::{
    domain::{ChannelId, DriverId, RaceId, RaceReport},
    Result,
};

/// Port for the upstream results provider (iRacing today).
///
/// `Ok(None)` means "no result newer than `after`" and must be cheap to
/// return on every poll. A transient failure (network, auth) is `Err` so the
/// poller can log it without touching registry state. Implementations must
/// only return reports with `race_id` strictly greater than `after`.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn latest_result(
        &self,
        driver: &DriverId,
        after: Option<RaceId>,
    ) -> Result<Option<RaceReport>>;
}

/// Port for posting notifications into a chat channel.
///
/// Telegram is the first implementation; the shape is kept small so future
/// adapters (Discord/Slack) fit behind the same interface.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Whether the destination still exists and can be posted to.
    ///
    /// A vanished channel means "skip this driver for this tick"; the
    /// registration is never removed automatically.
    async fn resolve_channel(&self, channel: ChannelId) -> bool;

    /// Deliver a formatted race report. Failure must be distinguishable from
    /// success so the poller can retry by leaving the marker unchanged.
    async fn deliver(
        &self,
        channel: ChannelId,
        display_name: &str,
        report: &RaceReport,
    ) -> Result<()>;
}
