//! Formatting utilities (race reports → Telegram HTML).

use chrono::Local;

use crate::domain::RaceReport;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn trend_arrow(delta: f64) -> &'static str {
    if delta > 0.0 {
        "📈"
    } else if delta < 0.0 {
        "📉"
    } else {
        "➡️"
    }
}

/// Render a finished race as a Telegram-HTML message.
///
/// Covers the fields the bot has always posted: finish/start position,
/// incidents, iRating and safety-rating deltas, race time, and optional
/// championship points, with a footer for strong finishes.
pub fn format_race_report(display_name: &str, r: &RaceReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("🏁 <b>Race Results: {}</b>", escape_html(display_name)));
    lines.push(format!(
        "<b>{}</b> at {}",
        escape_html(&r.series_name),
        escape_html(&r.track_name)
    ));
    lines.push(String::new());
    lines.push(format!(
        "Finish: <b>P{}</b> / {} (started P{})",
        r.finish_position, r.field_size, r.start_position
    ));
    lines.push(format!("Incidents: {}", r.incidents));
    lines.push(format!(
        "iRating: {} {:+} → {}",
        trend_arrow(r.irating_change as f64),
        r.irating_change,
        r.new_irating
    ));
    lines.push(format!(
        "Safety Rating: {} {:+.2} → {:.2}",
        trend_arrow(r.sr_change),
        r.sr_change,
        r.new_sr
    ));
    lines.push(format!("Race time: {}", escape_html(&r.race_time)));

    if let Some(points) = r.champ_points {
        lines.push(format!("Championship points: {points}"));
    }

    if let Some(footer) = finish_footer(r.finish_position) {
        lines.push(String::new());
        lines.push(footer.to_string());
    }

    lines.push(String::new());
    lines.push(format!(
        "<i>{}</i>",
        Local::now().format("%a %b %d %H:%M")
    ));

    lines.join("\n")
}

fn finish_footer(position: u32) -> Option<&'static str> {
    match position {
        1 => Some("🏆 Victory!"),
        2 | 3 => Some("🥉 Podium finish!"),
        4 | 5 => Some("Top 5 finish!"),
        _ => None,
    }
}
