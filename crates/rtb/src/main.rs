use std::sync::Arc;

use rtb_core::{config::Config, registry::TrackerRegistry};
use rtb_iracing::IracingClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rtb_core::logging::init("rtb");

    // A missing bot token is the only fatal startup condition.
    let cfg = Arc::new(Config::load()?);

    let registry = Arc::new(TrackerRegistry::load(&cfg.tracked_drivers_file));
    let source = Arc::new(IracingClient::new(
        cfg.iracing_email.clone(),
        cfg.iracing_password.clone(),
    ));

    rtb_telegram::router::run_polling(cfg, registry, source).await
}
