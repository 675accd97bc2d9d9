use mailparse::{MailHeaderMap, ParsedMail};

use crate::domain::mail::MailMessage;

/// Parse a raw RFC 822 message. Anything that cannot be decoded is left as
/// `None` so the feed can fall back per field.
pub fn parse_message(raw_rfc822: &[u8]) -> MailMessage {
    let parsed = match mailparse::parse_mail(raw_rfc822) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Unparseable mail ({} bytes): {e}", raw_rfc822.len());
            return MailMessage::default();
        }
    };

    let header = |name: &str| {
        parsed
            .headers
            .get_first_value(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    MailMessage {
        message_id: header("Message-ID").map(|id| strip_angle_brackets(&id).to_string()),
        subject: header("Subject"),
        from: header("From"),
        to: header("To"),
        cc: header("Cc"),
        date: header("Date"),
        html_body: extract_html_body(&parsed),
    }
}

impl MailMessage {
    pub fn parse(raw_rfc822: &[u8]) -> Self {
        parse_message(raw_rfc822)
    }
}

fn strip_angle_brackets(id: &str) -> &str {
    id.trim_start_matches('<').trim_end_matches('>')
}

/// First `text/html` part, else the first `text/plain` part wrapped in `<pre>`.
pub fn extract_html_body(p: &ParsedMail) -> Option<String> {
    if let Some(html) = find_part(p, "text/html") {
        return Some(html);
    }
    find_part(p, "text/plain").map(|text| format!("<pre>{}</pre>", escape_html(&text)))
}

fn find_part(p: &ParsedMail, wanted: &str) -> Option<String> {
    let mime = p.ctype.mimetype.to_ascii_lowercase();
    if mime == wanted && !is_attachment(p) {
        return p.get_body().ok().filter(|b| !b.trim().is_empty());
    }
    p.subparts.iter().find_map(|sp| find_part(sp, wanted))
}

fn is_attachment(p: &ParsedMail) -> bool {
    p.get_content_disposition().disposition == mailparse::DispositionType::Attachment
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
