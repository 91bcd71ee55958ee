// Hashing helpers shared by the cloud vendor clients.

use crate::core::moderation::DetectorError;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub fn hmac_sha256(key: &[u8], message: &str) -> Result<Vec<u8>, DetectorError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| DetectorError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// RFC 3986 encoding: unreserved characters kept, everything else `%XX`, space as `%20`.
pub fn percent_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}
