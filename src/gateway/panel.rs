use super::StatusSnapshot;
use crate::bot::Direction;
use crate::identity::SlotState;
use std::fmt::Write;

pub const READY_LABEL: &str = "ÇALIŞIYOR ✅";
pub const WAITING_LABEL: &str = "QR BEKLİYOR ⚠️";

/// Panel reload interval, seconds.
const REFRESH_SECS: u32 = 5;

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn slot_html(state: &SlotState) -> String {
    match state {
        SlotState::Unset => "<i>henüz bilinmiyor</i>".into(),
        SlotState::Configured(addr) => format!("<code>{}</code>", escape_html(addr)),
        SlotState::Inferred(addr) => {
            format!("<code>{}</code> <small>(trafikten)</small>", escape_html(addr))
        }
    }
}

fn toggle_form(action: &str, label: &str, on: bool) -> String {
    format!(
        r#"<form method="post" action="/toggle/{action}" style="display:inline"><button type="submit">{label}: {}</button></form>"#,
        if on { "AÇIK" } else { "KAPALI" }
    )
}

/// Render the status page. Every dynamic string is escaped.
pub fn render_panel(status: &StatusSnapshot) -> String {
    let mut html = String::with_capacity(4096);
    let state_label = if status.connection.ready {
        READY_LABEL
    } else {
        WAITING_LABEL
    };

    let _ = write!(
        html,
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8" />
<meta http-equiv="refresh" content="{REFRESH_SECS}" />
<title>WhatsApp Bot Durumu</title>
</head>
<body style="font-family: system-ui; padding: 20px;">
<h1>🤖 WhatsApp Bot</h1>
<p>Durum: <b>{state_label}</b></p>
"#
    );

    if !status.connection.ready {
        if let Some(qr) = &status.connection.qr {
            let _ = write!(
                html,
                r#"<h2>📸 QR Kod (telefonunla tara)</h2>
<img src="{}" style="width:250px; image-rendering: pixelated;" />
"#,
                escape_html(qr)
            );
        }
    }

    let _ = write!(
        html,
        "<p>{} {}</p>\n<hr>\n",
        toggle_form("lover", "Sevgili modu", status.modes.lover),
        toggle_form("self-echo", "Kendi mesajlarıma cevap", status.modes.self_echo),
    );

    let _ = write!(
        html,
        "<p>Ben: {}</p>\n<p>Hedef kullanıcı: {}</p>\n",
        slot_html(&status.identities.me),
        slot_html(&status.identities.counterparty),
    );

    html.push_str("<ul>\n<li>Mesajlara AI ile cevap verir</li>\n");
    let _ = writeln!(
        html,
        "<li>Spamde uyarır: “{}”</li>",
        escape_html(crate::bot::SPAM_WARNING)
    );
    for (time, text) in &status.greetings {
        let _ = writeln!(html, "<li>{} — {}</li>", escape_html(time), escape_html(text));
    }
    html.push_str("</ul>\n<hr>\n<h2>Son mesajlar</h2>\n");

    if status.log.is_empty() {
        html.push_str("<p><i>Henüz mesaj yok.</i></p>\n");
    } else {
        html.push_str("<table cellpadding=\"4\">\n");
        for entry in status.log.iter().rev() {
            let arrow = match entry.direction {
                Direction::In => "⬅️",
                Direction::Out => "➡️",
            };
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{arrow}</td><td><code>{}</code></td><td><code>{}</code></td><td>{}</td></tr>",
                entry.time.format("%H:%M:%S"),
                escape_html(&entry.from),
                escape_html(&entry.to),
                escape_html(&entry.body),
            );
        }
        html.push_str("</table>\n");
    }

    let _ = write!(
        html,
        "<hr><small>pairbot {} · build {}</small>\n</body>\n</html>\n",
        escape_html(status.version),
        escape_html(env!("PAIRBOT_BUILD_TIME")),
    );
    html
}
