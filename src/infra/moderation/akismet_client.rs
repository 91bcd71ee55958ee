// Akismet comment-check client.
// https://akismet.com/developers/comment-check/
//
// The key doubles as the subdomain. Akismet answers with a bare `true`
// (spam) or `false` (ham); anything else is an error, usually explained in
// the `X-akismet-debug-help` header.

use crate::core::moderation::{Detector, DetectorError, DetectorInput};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub struct AkismetClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl AkismetClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, DetectorError> {
        let client = Client::builder().timeout(timeout).build()?;
        let api_key = api_key.trim().to_string();

        Ok(Self {
            client,
            endpoint: format!("https://{}.rest.akismet.com/1.1/comment-check", api_key),
            api_key,
        })
    }

    fn form<'a>(input: &'a DetectorInput<'a>) -> Vec<(&'static str, &'a str)> {
        vec![
            ("blog", input.context.site_url.as_str()),
            ("user_ip", input.ip),
            ("user_agent", input.context.user_agent.as_str()),
            ("comment_type", "comment"),
            ("comment_author", input.author_name),
            ("comment_author_email", input.author_email),
            ("comment_content", input.content),
        ]
    }
}

/// Interpret a comment-check body. `Ok(true)` means the comment passed.
pub(crate) fn parse_verdict(body: &str, debug_help: Option<&str>) -> Result<bool, DetectorError> {
    match body.trim() {
        "false" => Ok(true),
        "true" => Ok(false),
        other => Err(DetectorError::Api {
            code: other.to_string(),
            message: debug_help.unwrap_or("unexpected comment-check response").to_string(),
        }),
    }
}

#[async_trait]
impl Detector for AkismetClient {
    fn name(&self) -> &str {
        "Akismet"
    }

    async fn check(&self, input: &DetectorInput<'_>) -> Result<bool, DetectorError> {
        if self.api_key.is_empty() {
            return Err(DetectorError::Signing("Akismet key is empty".to_string()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", "CommentModerator/0.1 | Akismet/1.1")
            .form(&Self::form(input))
            .send()
            .await?;

        let status = response.status();
        let debug_help = response
            .headers()
            .get("X-akismet-debug-help")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DetectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_verdict(&body, debug_help.as_deref())
    }
}
