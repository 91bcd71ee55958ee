// Tencent Cloud Text Moderation (TMS) client.
// https://cloud.tencent.com/document/api/1124/51860
//
// Requests are signed with TC3-HMAC-SHA256. The content is sent base64
// encoded; the answer's `Suggestion` is one of Pass / Review / Block.

use super::signing::{hmac_sha256, sha256_hex};
use crate::core::moderation::{Detector, DetectorError, DetectorInput, TencentConfig};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const HOST: &str = "tms.tencentcloudapi.com";
const SERVICE: &str = "tms";
const ACTION: &str = "TextModeration";
const VERSION: &str = "2020-12-29";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TextModerationRequest {
    content: String,
    data_id: String,
    user: TmsUser,
    device: TmsDevice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TmsUser {
    user_id: String,
    nickname: String,
}

#[derive(Debug, Serialize)]
struct TmsDevice {
    #[serde(rename = "IP")]
    ip: String,
}

#[derive(Debug, Deserialize)]
struct TmsEnvelope {
    #[serde(rename = "Response")]
    response: TmsResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TmsResponse {
    suggestion: Option<String>,
    error: Option<TmsError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TmsError {
    code: String,
    message: String,
}

pub struct TencentClient {
    client: Client,
    secret_id: String,
    secret_key: String,
    region: String,
}

impl TencentClient {
    pub fn new(config: &TencentConfig, timeout: Duration) -> Result<Self, DetectorError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            secret_id: config.secret_id.clone(),
            secret_key: config.secret_key.clone(),
            region: config.region.clone(),
        })
    }

    fn payload(input: &DetectorInput<'_>) -> Result<String, DetectorError> {
        let request = TextModerationRequest {
            content: STANDARD.encode(input.content),
            data_id: input.comment_id.to_string(),
            user: TmsUser {
                user_id: input.user_id.to_string(),
                nickname: input.author_name.to_string(),
            },
            device: TmsDevice {
                ip: input.ip.to_string(),
            },
        };
        serde_json::to_string(&request).map_err(|e| DetectorError::Parse(e.to_string()))
    }
}

/// Build the TC3-HMAC-SHA256 `Authorization` header for a JSON POST to `/`.
pub(crate) fn authorization(
    secret_id: &str,
    secret_key: &str,
    payload: &str,
    timestamp: i64,
) -> Result<String, DetectorError> {
    let date = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| DetectorError::Signing(format!("invalid timestamp {}", timestamp)))?
        .format("%Y-%m-%d")
        .to_string();

    let signed_headers = "content-type;host";
    let canonical_request = format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\n\n{}\n{}",
        CONTENT_TYPE,
        HOST,
        signed_headers,
        sha256_hex(payload)
    );

    let scope = format!("{}/{}/tc3_request", date, SERVICE);
    let string_to_sign = format!(
        "TC3-HMAC-SHA256\n{}\n{}\n{}",
        timestamp,
        scope,
        sha256_hex(&canonical_request)
    );

    let secret_date = hmac_sha256(format!("TC3{}", secret_key).as_bytes(), &date)?;
    let secret_service = hmac_sha256(&secret_date, SERVICE)?;
    let secret_signing = hmac_sha256(&secret_service, "tc3_request")?;
    let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign)?);

    Ok(format!(
        "TC3-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        secret_id, scope, signed_headers, signature
    ))
}

/// Interpret a TextModeration response body. `Ok(true)` means the comment passed.
pub(crate) fn parse_response(body: &str) -> Result<bool, DetectorError> {
    let envelope: TmsEnvelope =
        serde_json::from_str(body).map_err(|e| DetectorError::Parse(e.to_string()))?;

    if let Some(error) = envelope.response.error {
        return Err(DetectorError::Api {
            code: error.code,
            message: error.message,
        });
    }

    match envelope.response.suggestion.as_deref() {
        Some("Pass") => Ok(true),
        Some("Review") | Some("Block") => Ok(false),
        Some(other) => Err(DetectorError::Parse(format!("unknown suggestion {:?}", other))),
        None => Err(DetectorError::Parse("response has no suggestion".to_string())),
    }
}

#[async_trait]
impl Detector for TencentClient {
    fn name(&self) -> &str {
        "Tencent Cloud"
    }

    async fn check(&self, input: &DetectorInput<'_>) -> Result<bool, DetectorError> {
        let payload = Self::payload(input)?;
        let timestamp = Utc::now().timestamp();
        let authorization = authorization(&self.secret_id, &self.secret_key, &payload, timestamp)?;

        let response = self
            .client
            .post(format!("https://{}/", HOST))
            .header("Authorization", authorization)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", HOST)
            .header("X-TC-Action", ACTION)
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Version", VERSION)
            .header("X-TC-Region", &self.region)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DetectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{Comment, ModerationContext};

    #[test]
    fn pass_suggestion_passes() {
        let body = r#"{"Response":{"Suggestion":"Pass","Label":"Normal","RequestId":"abc"}}"#;
        assert!(parse_response(body).unwrap());
    }

    #[test]
    fn review_and_block_fail() {
        let review = r#"{"Response":{"Suggestion":"Review","RequestId":"abc"}}"#;
        let block = r#"{"Response":{"Suggestion":"Block","RequestId":"abc"}}"#;
        assert!(!parse_response(review).unwrap());
        assert!(!parse_response(block).unwrap());
    }

    #[test]
    fn api_error_is_reported() {
        let body = r#"{"Response":{"Error":{"Code":"AuthFailure.SignatureExpire","Message":"expired"},"RequestId":"abc"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, DetectorError::Api { ref code, .. } if code == "AuthFailure.SignatureExpire"));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_response("<html>"), Err(DetectorError::Parse(_))));
    }

    #[test]
    fn authorization_has_tc3_shape() {
        // 2021-01-01T00:00:00Z
        let auth = authorization("AKIDEXAMPLE", "secret", "{}", 1_609_459_200).unwrap();

        assert!(auth.starts_with(
            "TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/2021-01-01/tms/tc3_request, SignedHeaders=content-type;host, Signature="
        ));
        let signature = auth.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn authorization_matches_known_signature() {
        let auth = authorization("AKIDEXAMPLE", "secret", "{\"a\":1}", 1_609_459_200).unwrap();

        assert_eq!(
            auth,
            "TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/2021-01-01/tms/tc3_request, \
             SignedHeaders=content-type;host, \
             Signature=21c48f65d65d811a6968fde96ce444951bfd87ba7d257c32351dd6af2ddfb011"
        );
    }

    #[test]
    fn signature_depends_on_payload_and_key() {
        let base = authorization("id", "secret", "{}", 1_609_459_200).unwrap();
        assert_eq!(base, authorization("id", "secret", "{}", 1_609_459_200).unwrap());
        assert_ne!(base, authorization("id", "secret", "{\"a\":1}", 1_609_459_200).unwrap());
        assert_ne!(base, authorization("id", "other", "{}", 1_609_459_200).unwrap());
    }

    #[test]
    fn payload_encodes_content_and_identity() {
        let comment = Comment {
            id: 9,
            content: "hi".to_string(),
            user_id: 3,
            ..Default::default()
        };
        let context = ModerationContext {
            ip: "192.0.2.1".to_string(),
            author_name: "carol".to_string(),
            ..Default::default()
        };
        let payload = TencentClient::payload(&DetectorInput::new(&comment, &context)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(json["Content"], "aGk=");
        assert_eq!(json["DataId"], "9");
        assert_eq!(json["User"]["UserId"], "3");
        assert_eq!(json["User"]["Nickname"], "carol");
        assert_eq!(json["Device"]["IP"], "192.0.2.1");
    }
}
