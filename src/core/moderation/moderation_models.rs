// Moderation domain models - data structures for the comment moderation pipeline.
//
// These are pure domain types with no HTTP or database dependencies.
// The infra layer converts rows and API payloads into these.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::detector::DetectorVerdict;

/// A user-submitted comment as seen by the moderation pipeline.
///
/// `content` and `is_pending` are the only fields the pipeline mutates.
/// Once `is_pending` is true it stays true until a human reviewer clears it;
/// nothing in this crate ever un-flags a comment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub content: String,
    pub is_pending: bool,
    pub user_id: u64,
    /// Empty when the comment was not submitted through a named site.
    pub site_name: String,
    pub page_key: String,
    pub ip: String,
    pub user_agent: String,
}

/// The author of a comment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

/// A site record. `urls` is the raw comma separated list an admin configured.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub urls: String,
}

impl Site {
    /// Every configured URL, trimmed, blanks dropped.
    pub fn url_list(&self) -> Vec<String> {
        self.urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The primary URL of the site, or an empty string when none is configured.
    pub fn first_url(&self) -> String {
        self.url_list().into_iter().next().unwrap_or_default()
    }
}

/// Request data captured when the comment was submitted.
///
/// All fields are optional because a moderation pass can also be started
/// outside of a request (for example when re-checking stored comments).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
}

/// Read-only snapshot assembled before any detector runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModerationContext {
    /// Origin of the site the comment was posted on (`scheme://host`), or empty.
    pub site_url: String,
    pub ip: String,
    pub user_agent: String,
    pub author_name: String,
    pub author_email: String,
}

/// Everything a detector adapter may look at, borrowed from the comment and context.
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    pub content: &'a str,
    pub author_name: &'a str,
    pub author_email: &'a str,
    pub comment_id: u64,
    pub user_id: u64,
    pub ip: &'a str,
    pub context: &'a ModerationContext,
}

impl<'a> DetectorInput<'a> {
    pub fn new(comment: &'a Comment, context: &'a ModerationContext) -> Self {
        Self {
            content: &comment.content,
            author_name: &context.author_name,
            author_email: &context.author_email,
            comment_id: comment.id,
            user_id: comment.user_id,
            ip: &context.ip,
            context,
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How the keyword filter reacts to a lexicon hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeywordMode {
    /// Stop at the first hit and hold the comment for review, content untouched.
    Flag,
    /// Replace every hit with `filler` repeated to the keyword's character count.
    Redact { filler: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    pub enabled: bool,
    /// Lexicon files, loaded in this order.
    pub files: Vec<PathBuf>,
    /// Separator between keywords inside a lexicon file.
    pub separator: String,
    pub mode: KeywordMode,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            files: Vec::new(),
            separator: "\n".to_string(),
            mode: KeywordMode::Redact {
                filler: "x".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AkismetConfig {
    /// Detector is enabled when the trimmed key is non-empty.
    #[serde(skip_serializing)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TencentConfig {
    pub enabled: bool,
    pub secret_id: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliyunConfig {
    pub enabled: bool,
    pub access_key_id: String,
    #[serde(skip_serializing)]
    pub access_key_secret: String,
    pub region: String,
}

/// Process-wide moderation settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeratorConfig {
    /// New comments from non-admins start out pending.
    pub pending_default: bool,
    /// Treat a detector that fails to answer as if it had flagged the comment.
    pub api_fail_block: bool,
    pub akismet: AkismetConfig,
    pub tencent: TencentConfig,
    pub aliyun: AliyunConfig,
    pub keywords: KeywordConfig,
    /// Maximum number of moderation passes running at once.
    pub workers: usize,
    /// Jobs that may wait in the queue before submissions are rejected.
    pub queue_capacity: usize,
    pub detector_timeout: Duration,
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            pending_default: false,
            api_fail_block: false,
            akismet: AkismetConfig::default(),
            tencent: TencentConfig::default(),
            aliyun: AliyunConfig::default(),
            keywords: KeywordConfig::default(),
            workers: 4,
            queue_capacity: 256,
            detector_timeout: Duration::from_secs(10),
        }
    }
}

impl ModeratorConfig {
    /// Initial pending flag for a freshly created comment.
    pub fn initial_pending(&self, is_admin: bool) -> bool {
        !is_admin && self.pending_default
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Final state of a comment after one moderation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationState {
    Clean,
    Pending,
    Rewritten,
}

impl std::fmt::Display for ModerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModerationState::Clean => write!(f, "clean"),
            ModerationState::Pending => write!(f, "pending"),
            ModerationState::Rewritten => write!(f, "rewritten"),
        }
    }
}

/// One detector's answer, kept for the audit trail.
#[derive(Debug)]
pub struct DetectorRecord {
    pub detector: String,
    pub verdict: DetectorVerdict,
}

/// What a moderation pass did to a comment.
#[derive(Debug)]
pub struct ModerationReport {
    pub comment_id: u64,
    pub state: ModerationState,
    /// The rule that moved the comment to pending during this pass, if any.
    pub blocked_by: Option<String>,
    pub verdicts: Vec<DetectorRecord>,
    /// Number of saves that failed; the in-memory comment still holds the change.
    pub persist_failures: u32,
}
