use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;

use crate::config::Config;

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Email relay error: {0}")]
    RelayError(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailMessage {
    pub fn new(from: &str, to: &str, subject: impl Into<String>, html: String) -> Self {
        Self {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: subject.into(),
            text: html_to_text(&html),
            html,
        }
    }
}

#[derive(Clone)]
pub struct RelayMailer {
    client: Client,
    endpoint: String,
    token: Option<Secret<String>>,
}

/// Outbound email delivery.
///
/// `Log` writes messages to the trace log and is used when no relay is configured.
#[derive(Clone)]
pub enum Mailer {
    Log,
    Relay(RelayMailer),
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        match &config.email_relay_url {
            Some(url) if !url.is_empty() => Mailer::relay(url, config.email_relay_token.clone()),
            _ => Mailer::Log,
        }
    }

    pub fn relay(endpoint: &str, token: Option<Secret<String>>) -> Self {
        Mailer::Relay(RelayMailer {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            token,
        })
    }

    #[tracing::instrument(skip(self, message), fields(subject = %message.subject))]
    pub async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        match self {
            Mailer::Log => {
                tracing::info!(
                    from = %message.from,
                    to = ?message.to,
                    body = %message.text,
                    "Email not sent (no relay configured)"
                );
                Ok(())
            }
            Mailer::Relay(relay) => relay.send(message).await,
        }
    }
}

impl RelayMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(std::time::Duration::from_secs(10))
            .json(message);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = %status, error = %error_text, "Email relay rejected message");
            return Err(MailError::RelayError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        tracing::info!(to = ?message.to, "Email sent");
        Ok(())
    }
}

/// Plain-text alternative of an HTML email body
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut tag = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0usize;

    for c in html.chars() {
        match (in_tag, c) {
            (false, '<') => {
                in_tag = true;
                tag.clear();
            }
            (true, '>') => {
                in_tag = false;
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                let closing = tag.starts_with('/');

                match name.as_str() {
                    "style" | "head" | "title" if closing => {
                        skip_depth = skip_depth.saturating_sub(1)
                    }
                    "style" | "head" | "title" => skip_depth += 1,
                    "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "table" => {
                        text.push('\n')
                    }
                    "td" | "th" if closing => text.push(' '),
                    _ => {}
                }
            }
            (true, c) => tag.push(c),
            (false, c) if skip_depth == 0 => text.push(c),
            (false, _) => {}
        }
    }

    let decoded = html_escape::decode_html_entities(&text);

    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage::new(
            "no-reply@parks.example",
            "jo@example.com",
            "Your Park Pass",
            "<p>Hi Jo,</p><p>Pass <b>PP000001</b> is ready.</p>".to_string(),
        )
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><title>x</title><style>p { color: red; }</style></head>
            <body><p>Dear Jo,</p>
            <table><tr><td>Pass</td><td>PP000001</td></tr></table>
            <p>Fish &amp; Chips<br>Kings Park</p></body></html>"#;

        let text = html_to_text(html);

        assert!(!text.contains("color"));
        assert!(!text.contains('<'));
        assert!(text.contains("Dear Jo,"));
        assert!(text.contains("Pass PP000001"));
        assert!(text.contains("Fish & Chips\nKings Park"));
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn test_message_has_text_alternative() {
        let message = message();
        assert_eq!(message.text, "Hi Jo,\n\nPass PP000001 is ready.");
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        assert!(Mailer::Log.send(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_relay_posts_message_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("Authorization", "Bearer relay-token"))
            .and(body_partial_json(serde_json::json!({
                "to": ["jo@example.com"],
                "subject": "Your Park Pass"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = Mailer::relay(
            &format!("{}/send", server.uri()),
            Some(Secret::new("relay-token".to_string())),
        );

        assert!(mailer.send(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_relay_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let mailer = Mailer::relay(&server.uri(), None);
        let result = mailer.send(&message()).await;

        assert!(matches!(result, Err(MailError::RelayError(e)) if e.contains("down")));
    }
}
