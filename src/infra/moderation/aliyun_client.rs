// Aliyun Content Moderation (green-cip) text client.
// https://help.aliyun.com/document_detail/433945.html
//
// RPC-style call: parameters travel in the query string, the body is empty,
// and the request is signed with ACS3-HMAC-SHA256. A comment passes when the
// service returns Code 200 with no risk labels.

use super::signing::{hmac_sha256, percent_encode, sha256_hex};
use crate::core::moderation::{AliyunConfig, Detector, DetectorError, DetectorInput};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const ACTION: &str = "TextModeration";
const VERSION: &str = "2022-03-02";
const SERVICE: &str = "comment_detection";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GreenResponse {
    /// Numeric on success, a string error code on gateway errors.
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<GreenData>,
}

#[derive(Debug, Deserialize, Default)]
struct GreenData {
    #[serde(default)]
    labels: String,
}

/// A request ready to send: final URL plus the headers that were signed.
#[derive(Debug)]
pub(crate) struct SignedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

pub struct AliyunClient {
    client: Client,
    access_key_id: String,
    access_key_secret: String,
    host: String,
}

impl AliyunClient {
    pub fn new(config: &AliyunConfig, timeout: Duration) -> Result<Self, DetectorError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            access_key_id: config.access_key_id.clone(),
            access_key_secret: config.access_key_secret.clone(),
            host: format!("green-cip.{}.aliyuncs.com", config.region),
        })
    }

    fn query(input: &DetectorInput<'_>) -> Vec<(String, String)> {
        let parameters = json!({
            "content": input.content,
            "dataId": input.comment_id.to_string(),
        });

        vec![
            ("Service".to_string(), SERVICE.to_string()),
            ("ServiceParameters".to_string(), parameters.to_string()),
        ]
    }
}

/// Sign an empty-body POST to `/` with ACS3-HMAC-SHA256.
pub(crate) fn sign_request(
    access_key_id: &str,
    access_key_secret: &str,
    host: &str,
    query: &[(String, String)],
    date: &str,
    nonce: &str,
) -> Result<SignedRequest, DetectorError> {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    pairs.sort();
    let canonical_query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let hashed_payload = sha256_hex("");
    // Already in lexicographic order.
    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-acs-action".to_string(), ACTION.to_string()),
        ("x-acs-content-sha256".to_string(), hashed_payload.clone()),
        ("x-acs-date".to_string(), date.to_string()),
        ("x-acs-signature-nonce".to_string(), nonce.to_string()),
        ("x-acs-version".to_string(), VERSION.to_string()),
    ];

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "POST\n/\n{}\n{}\n{}\n{}",
        canonical_query, canonical_headers, signed_headers, hashed_payload
    );
    let string_to_sign = format!("ACS3-HMAC-SHA256\n{}", sha256_hex(&canonical_request));
    let signature = hex::encode(hmac_sha256(access_key_secret.as_bytes(), &string_to_sign)?);

    headers.push((
        "Authorization".to_string(),
        format!(
            "ACS3-HMAC-SHA256 Credential={},SignedHeaders={},Signature={}",
            access_key_id, signed_headers, signature
        ),
    ));

    Ok(SignedRequest {
        url: format!("https://{}/?{}", host, canonical_query),
        headers,
    })
}

/// Interpret a TextModeration body. `Ok(true)` means the comment passed.
pub(crate) fn parse_response(body: &str) -> Result<bool, DetectorError> {
    let response: GreenResponse =
        serde_json::from_str(body).map_err(|e| DetectorError::Parse(e.to_string()))?;

    if response.code.as_i64() != Some(200) {
        let code = match &response.code {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(DetectorError::Api {
            code,
            message: response.message.unwrap_or_default(),
        });
    }

    let labels = response.data.unwrap_or_default().labels;
    Ok(labels.trim().is_empty())
}

#[async_trait]
impl Detector for AliyunClient {
    fn name(&self) -> &str {
        "Aliyun"
    }

    async fn check(&self, input: &DetectorInput<'_>) -> Result<bool, DetectorError> {
        let date = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = format!("{:032x}", rand::random::<u128>());
        let signed = sign_request(
            &self.access_key_id,
            &self.access_key_secret,
            &self.host,
            &Self::query(input),
            &date,
            &nonce,
        )?;

        let mut request = self.client.post(&signed.url);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
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
