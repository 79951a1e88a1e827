//! HTML pages for the browser side of the QR login
//!
//! Deliberately plain: no external assets, inline styles only. Every
//! interpolated value goes through `escape_html`.

use alipan_auth::FailureKind;
use alipan_openapi::{LoginStatus, TokenPair};

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:40rem;margin:3rem auto;padding:0 1rem;color:#222}\
code,pre{background:#f4f4f4;padding:.2rem .4rem;border-radius:4px;word-break:break-all;white-space:pre-wrap}\
.muted{color:#666}.error{color:#b00020}a.button{display:inline-block;margin:.5rem .5rem 0 0;padding:.5rem 1rem;background:#4a5dd4;color:#fff;border-radius:4px;text-decoration:none}";

/// Escape text for use in element content and quoted attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

/// Landing page: where to start the login and what to paste into alist.
pub fn index(token_url: &str) -> String {
    let token_url = escape_html(token_url);
    layout(
        "Alipan authorization relay",
        &format!(
            "<h1>Alipan authorization relay</h1>\n\
             <p>Obtain a refresh token for alist's <code>AliyundriveOpen</code> storage driver.</p>\n\
             <a class=\"button\" href=\"/auth\">Start authorization</a>\n\
             <h2>alist settings</h2>\n\
             <p>Oauth token URL: <code>{token_url}</code></p>\n\
             <p class=\"muted\">Leave client ID and client secret empty to use this relay's application.</p>"
        ),
    )
}

/// Interstitial shown while the browser follows the `Refresh` header.
pub fn redirect(target: &str) -> String {
    let target = escape_html(target);
    layout(
        "Redirecting",
        &format!(
            "<h1>Preparing QR code</h1>\n\
             <p>If nothing happens, <a href=\"{target}\">continue to the QR code</a>.</p>"
        ),
    )
}

fn status_text(status: &LoginStatus) -> &'static str {
    match status {
        LoginStatus::AwaitingScan => "Scan the QR code with the Alipan app",
        LoginStatus::Scanned => "Scanned. Confirm the login on your phone",
        LoginStatus::LoggedIn => "Login confirmed",
        LoginStatus::Expired => "The QR code has expired",
        LoginStatus::Unknown(_) => "Checking status",
    }
}

/// Polling page. The caller sets the matching `Refresh` header.
pub fn waiting(qr_image_url: &str, status: &LoginStatus, refresh_secs: u64) -> String {
    let qr_image_url = escape_html(qr_image_url);
    let text = status_text(status);
    let raw = escape_html(status.as_wire());
    layout(
        "Waiting for authorization",
        &format!(
            "<h1>Waiting for authorization</h1>\n\
             <p><img src=\"{qr_image_url}\" alt=\"Login QR code\" width=\"300\" height=\"300\"></p>\n\
             <p>{text} <span class=\"muted\">({raw})</span></p>\n\
             <p class=\"muted\">This page checks again every {refresh_secs} seconds.</p>"
        ),
    )
}

/// Terminal page for an expired QR session. No automatic refresh.
pub fn expired() -> String {
    layout(
        "QR code expired",
        "<h1>QR code expired</h1>\n\
         <p>The QR code was not confirmed in time.</p>\n\
         <a class=\"button\" href=\"/auth\">Generate a new QR code</a>",
    )
}

/// Token pair page shown once after a successful login.
pub fn success(tokens: &TokenPair, token_url: &str) -> String {
    let refresh_token = escape_html(&tokens.refresh_token);
    let access_token = escape_html(&tokens.access_token);
    let token_url = escape_html(token_url);
    let expires_in = tokens.expires_in;
    layout(
        "Authorization complete",
        &format!(
            "<h1>Authorization complete</h1>\n\
             <p>Copy these values into alist's storage settings.</p>\n\
             <h2>Refresh token</h2>\n<pre id=\"refresh_token\">{refresh_token}</pre>\n\
             <h2>Oauth token URL</h2>\n<pre id=\"token_url\">{token_url}</pre>\n\
             <details><summary>Access token (expires in {expires_in} seconds)</summary>\n\
             <pre id=\"access_token\">{access_token}</pre></details>\n\
             <p class=\"muted\">These tokens are not stored by the relay. Keep this page private.</p>"
        ),
    )
}

/// Diagnostic page for a failed login, with remediation for the failure kind.
pub fn failure(message: &str, timestamp: &str) -> String {
    let kind = FailureKind::classify(message);
    let detail = escape_html(kind.hint().unwrap_or(message));
    let message = escape_html(message);
    let timestamp = escape_html(timestamp);
    layout(
        "Authorization failed",
        &format!(
            "<h1 class=\"error\">Authorization failed</h1>\n\
             <p><strong>Error type:</strong> <code>{kind}</code></p>\n\
             <p>{remediation}</p>\n\
             <a class=\"button\" href=\"/auth\">Start again</a> <a class=\"button\" href=\"/\">Home</a>\n\
             <details><summary>Technical details</summary>\n\
             <p>{detail}</p>\n<pre>{message}</pre>\n<p class=\"muted\">Time: {timestamp}</p></details>",
            kind = kind.as_str(),
            remediation = kind.remediation(),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_markup_and_quotes() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn waiting_page_shows_qr_and_status() {
        let html = waiting(
            "https://openapi.alipan.com/oauth/qrcode/qr-1",
            &LoginStatus::Scanned,
            10,
        );
        assert!(html.contains("src=\"https://openapi.alipan.com/oauth/qrcode/qr-1\""));
        assert!(html.contains("Confirm the login on your phone"));
        assert!(html.contains("every 10 seconds"));
    }

    #[test]
    fn success_page_escapes_tokens() {
        let tokens = TokenPair {
            token_type: "Bearer".into(),
            access_token: "at<script>".into(),
            refresh_token: "rt_value".into(),
            expires_in: 7200,
        };
        let html = success(&tokens, "https://relay.example/token");
        assert!(html.contains("at&lt;script&gt;"));
        assert!(!html.contains("at<script>"));
        assert!(html.contains("rt_value"));
    }

    #[test]
    fn failure_page_is_classified() {
        let html = failure(
            "authorization code exchange gave up after 3 attempts: provider returned 400: InvalidCode",
            "2026-01-01T00:00:00.000Z",
        );
        assert!(html.contains("<code>code_expired</code>"));
        assert!(html.contains("valid for 10 minutes"));

        let html = failure("connection reset", "now");
        assert!(html.contains("<code>unknown</code>"));
        assert!(html.contains("connection reset"));
    }

    #[test]
    fn expired_page_links_to_new_session() {
        assert!(expired().contains("href=\"/auth\""));
    }
}
