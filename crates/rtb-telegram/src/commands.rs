use std::sync::Arc;

use teloxide::prelude::*;
use tracing::warn;

use rtb_core::{
    domain::{ChannelId, RaceReport, Registration},
    formatting::escape_html,
    ports::NotificationSink,
};

use crate::router::AppState;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let user_id = msg.from().map(|u| u.id.0 as i64);
    if !is_authorized(user_id, &state.cfg.telegram_allowed_users) {
        let _ = bot
            .send_message(msg.chat.id, "Unauthorized. Contact the bot owner for access.")
            .await;
        return Ok(());
    }

    let channel = ChannelId(msg.chat.id.0);
    let (cmd, args) = parse_command(text);

    let reply = match cmd.as_str() {
        "track" => track(&state, channel, &args).await,
        "untrack" => untrack(&state, &args).await,
        "tracked" => tracked_list_html(&state.registry.list().await),
        "testresult" => test_result(&state, channel, &args).await,
        "help" | "start" => help_html(),
        other => format!(
            "❌ Unknown command /{}. Use /help to see available commands.",
            escape_html(other)
        ),
    };

    if let Err(e) = state.notifier.send_html(channel, &reply).await {
        warn!(chat = channel.0, error = %e, "failed to send command reply");
    }
    Ok(())
}

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn is_authorized(user_id: Option<i64>, allowed: &[i64]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    user_id.map(|id| allowed.contains(&id)).unwrap_or(false)
}

async fn track(state: &AppState, channel: ChannelId, args: &str) -> String {
    if args.is_empty() {
        return "Usage: /track &lt;driver name&gt;".to_string();
    }

    match state.registry.register(args, channel).await {
        Ok(reg) => {
            let minutes = state.cfg.poll_interval.as_secs().max(60) / 60;
            format!(
                "✅ <b>Driver Tracking Enabled</b>\n\nNow tracking race results for <b>{}</b>.\nResults will be posted to this chat.\nCheck interval: every {minutes} minutes.\n\nUse /untrack {} to stop.",
                escape_html(&reg.display_name),
                escape_html(&reg.display_name)
            )
        }
        Err(e) => {
            warn!(driver = args, error = %e, "failed to persist registration");
            format!(
                "❌ Could not save tracking for <b>{}</b>: {}",
                escape_html(args),
                escape_html(&e.to_string())
            )
        }
    }
}

async fn untrack(state: &AppState, args: &str) -> String {
    if args.is_empty() {
        return "Usage: /untrack &lt;driver name&gt;".to_string();
    }

    match state.registry.unregister(args).await {
        Ok(true) => format!(
            "✅ Stopped tracking race results for <b>{}</b>.",
            escape_html(args)
        ),
        Ok(false) => format!(
            "❌ <b>{}</b> is not currently being tracked.",
            escape_html(args)
        ),
        Err(e) => {
            warn!(driver = args, error = %e, "failed to persist unregistration");
            format!(
                "❌ Could not remove <b>{}</b>: {}",
                escape_html(args),
                escape_html(&e.to_string())
            )
        }
    }
}

fn tracked_list_html(registrations: &[Registration]) -> String {
    if registrations.is_empty() {
        return "No drivers are currently being tracked. Use /track &lt;name&gt; to start.".to_string();
    }

    let mut lines = vec![format!(
        "📋 <b>Tracked Drivers ({})</b>",
        registrations.len()
    )];
    for reg in registrations {
        let marker = match reg.last_race {
            Some(r) => format!("last race {}", r.0),
            None => "no results posted yet".to_string(),
        };
        lines.push(format!(
            "• <b>{}</b> → chat {} ({marker})",
            escape_html(&reg.display_name),
            reg.channel_id.0
        ));
    }
    lines.join("\n")
}

/// Manual "post a result now" entry point, for testing and demos.
async fn test_result(state: &AppState, channel: ChannelId, args: &str) -> String {
    if args.is_empty() {
        return "Usage: /testresult &lt;driver name&gt;".to_string();
    }

    match state
        .notifier
        .deliver(channel, args, &RaceReport::sample())
        .await
    {
        Ok(()) => format!("Posted a sample result for <b>{}</b>.", escape_html(args)),
        Err(e) => format!("❌ Sample post failed: {}", escape_html(&e.to_string())),
    }
}

fn help_html() -> String {
    [
        "🤖 <b>Race Tracker Bot</b>",
        "",
        "/track &lt;name&gt; — auto-post race results for a driver",
        "/untrack &lt;name&gt; — stop auto-posting",
        "/tracked — list tracked drivers",
        "/testresult &lt;name&gt; — post a sample result",
        "/help — this overview",
        "",
        "Race results are checked periodically for all tracked drivers.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtb_core::domain::{DriverId, RaceId};

    #[test]
    fn parses_command_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command("/track@rtb_bot Max Verstappen"),
            ("track".to_string(), "Max Verstappen".to_string())
        );
        assert_eq!(parse_command("/tracked"), ("tracked".to_string(), String::new()));
        assert_eq!(parse_command("/TRACK bob"), ("track".to_string(), "bob".to_string()));
    }

    #[test]
    fn empty_allowlist_authorizes_everyone() {
        assert!(is_authorized(Some(1), &[]));
        assert!(is_authorized(None, &[]));
        assert!(is_authorized(Some(7), &[7, 8]));
        assert!(!is_authorized(Some(9), &[7, 8]));
        assert!(!is_authorized(None, &[7]));
    }

    #[test]
    fn tracked_list_shows_marker_state() {
        let regs = vec![
            Registration {
                driver_id: DriverId::normalize("Bob"),
                display_name: "Bob".to_string(),
                channel_id: ChannelId(42),
                last_race: Some(RaceId(100)),
            },
            Registration {
                driver_id: DriverId::normalize("Eve"),
                display_name: "Eve".to_string(),
                channel_id: ChannelId(43),
                last_race: None,
            },
        ];

        let html = tracked_list_html(&regs);
        assert!(html.contains("Tracked Drivers (2)"));
        assert!(html.contains("last race 100"));
        assert!(html.contains("no results posted yet"));

        assert!(tracked_list_html(&[]).contains("No drivers"));
    }
}
