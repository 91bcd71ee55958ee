// Detector port - one independent spam signal.
//
// The orchestrator only ever sees this trait. Each external service gets an
// implementation in infra/moderation, so adding a vendor never touches the
// orchestration logic.

use super::moderation_models::DetectorInput;
use async_trait::async_trait;
use thiserror::Error;

/// A detector could not evaluate the comment.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Request signing failed: {0}")]
    Signing(String),
}

impl From<reqwest::Error> for DetectorError {
    fn from(err: reqwest::Error) -> Self {
        DetectorError::Http(err.to_string())
    }
}

/// Outcome of a single detector invocation.
#[derive(Debug)]
pub enum DetectorVerdict {
    Pass,
    Fail,
    Error(DetectorError),
}

impl DetectorVerdict {
    pub fn from_result(result: Result<bool, DetectorError>) -> Self {
        match result {
            Ok(true) => DetectorVerdict::Pass,
            Ok(false) => DetectorVerdict::Fail,
            Err(err) => DetectorVerdict::Error(err),
        }
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Judge one comment.
    ///
    /// `Ok(true)` means the comment passed, `Ok(false)` means the signal
    /// positively identified it as spam. An error means the signal itself
    /// could not be evaluated. Implementations never mutate the comment.
    async fn check(&self, input: &DetectorInput<'_>) -> Result<bool, DetectorError>;
}

// Lets the service hold a heterogeneous, ordered list of detectors.
#[async_trait]
impl Detector for Box<dyn Detector> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn check(&self, input: &DetectorInput<'_>) -> Result<bool, DetectorError> {
        (**self).check(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_maps_results() {
        assert!(matches!(
            DetectorVerdict::from_result(Ok(true)),
            DetectorVerdict::Pass
        ));
        assert!(matches!(
            DetectorVerdict::from_result(Ok(false)),
            DetectorVerdict::Fail
        ));
        assert!(matches!(
            DetectorVerdict::from_result(Err(DetectorError::Parse("bad json".into()))),
            DetectorVerdict::Error(DetectorError::Parse(_))
        ));
    }

    #[test]
    fn detector_error_messages_are_descriptive() {
        let err = DetectorError::Api {
            code: "AuthFailure".into(),
            message: "signature expired".into(),
        };
        assert_eq!(err.to_string(), "API error AuthFailure: signature expired");

        let err = DetectorError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert!(err.to_string().contains("503"));
    }
}
