// Moderation service - the decision pipeline for newly created comments.
//
// One pass per comment:
// 1. Build a ModerationContext (author, site URL, request provenance)
// 2. Run every configured detector in order, applying the fail-closed policy
// 3. Run the keyword filter
// 4. Persist whatever changed
//
// Detectors are never short-circuited: every signal runs exactly once so its
// verdict shows up in the logs, even after the comment is already pending.
// No lock is held while a detector call is in flight.
//
// Callers must not start two passes for the same comment at the same time.

use super::comment_store::{CommentStore, StoreError};
use super::detector::{Detector, DetectorVerdict};
use super::keyword_filter;
use super::lexicon::{KeywordLexicon, LexiconSource};
use super::moderation_models::{
    Comment, DetectorInput, DetectorRecord, KeywordMode, ModerationContext, ModerationReport,
    ModerationState, RequestMeta,
};
use url::Url;

/// Name the keyword rule is reported under.
pub const KEYWORD_RULE: &str = "Keywords";

pub type SharedLexicon = KeywordLexicon<Box<dyn LexiconSource>>;

struct KeywordRule {
    lexicon: SharedLexicon,
    mode: KeywordMode,
}

pub struct ModerationService<S: CommentStore> {
    store: S,
    /// Run in this order, every pass.
    detectors: Vec<Box<dyn Detector>>,
    keywords: Option<KeywordRule>,
    /// Treat a detector error as a spam verdict.
    api_fail_block: bool,
}

impl<S: CommentStore> ModerationService<S> {
    pub fn new(store: S, api_fail_block: bool) -> Self {
        Self {
            store,
            detectors: Vec::new(),
            keywords: None,
            api_fail_block,
        }
    }

    /// Append a detector to the end of the chain.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Enable the keyword filter. Without this call the filter is skipped.
    pub fn with_keyword_filter(mut self, lexicon: SharedLexicon, mode: KeywordMode) -> Self {
        self.keywords = Some(KeywordRule { lexicon, mode });
        self
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Judge one comment and apply the resulting side effect.
    ///
    /// Never fails: detector errors are degraded per the fail-closed policy
    /// and save failures are logged and counted in the report. The comment
    /// passed in reflects the final state even when a save failed.
    pub async fn moderate(&self, comment: &mut Comment, request: &RequestMeta) -> ModerationReport {
        let context = self.build_context(comment, request).await;

        let mut report = ModerationReport {
            comment_id: comment.id,
            state: ModerationState::Clean,
            blocked_by: None,
            verdicts: Vec::with_capacity(self.detectors.len() + 1),
            persist_failures: 0,
        };

        for detector in &self.detectors {
            let name = detector.name();
            let result = {
                let input = DetectorInput::new(comment, &context);
                detector.check(&input).await
            };
            let verdict = DetectorVerdict::from_result(result);

            match &verdict {
                DetectorVerdict::Pass => {
                    tracing::debug!(detector = name, comment_id = comment.id, "Detector passed comment");
                }
                DetectorVerdict::Fail => {
                    self.block(comment, name, &mut report).await;
                }
                DetectorVerdict::Error(e) => {
                    tracing::error!(
                        detector = name,
                        comment_id = comment.id,
                        "Detector failed to evaluate comment: {}",
                        e
                    );
                    if self.api_fail_block {
                        self.block(comment, name, &mut report).await;
                    }
                }
            }

            report.verdicts.push(DetectorRecord {
                detector: name.to_string(),
                verdict,
            });
        }

        let rewritten = self.apply_keywords(comment, &mut report).await;

        report.state = if comment.is_pending {
            ModerationState::Pending
        } else if rewritten {
            ModerationState::Rewritten
        } else {
            ModerationState::Clean
        };

        report
    }

    /// Move a comment to pending and save it.
    ///
    /// Returns `Ok(false)` when the comment was already pending (nothing is
    /// saved), `Ok(true)` when it was flipped and saved. On a save error the
    /// in-memory comment stays pending.
    pub async fn mark_pending(&self, comment: &mut Comment, blocker: &str) -> Result<bool, StoreError> {
        tracing::info!(
            detector = blocker,
            comment_id = comment.id,
            "Comment flagged as spam: {:?}",
            comment.content
        );

        if comment.is_pending {
            return Ok(false);
        }

        comment.is_pending = true;
        self.store.update_comment(comment).await.map(|_| true)
    }

    async fn block(&self, comment: &mut Comment, blocker: &str, report: &mut ModerationReport) {
        match self.mark_pending(comment, blocker).await {
            Ok(true) => {
                report.blocked_by.get_or_insert_with(|| blocker.to_string());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(comment_id = comment.id, "Failed to save pending comment: {}", e);
                report.persist_failures += 1;
                report.blocked_by.get_or_insert_with(|| blocker.to_string());
            }
        }
    }

    /// Returns true when the comment content was rewritten.
    async fn apply_keywords(&self, comment: &mut Comment, report: &mut ModerationReport) -> bool {
        let Some(rule) = &self.keywords else {
            return false;
        };

        let lexicon = rule.lexicon.keywords().await;
        let outcome = keyword_filter::filter(&comment.content, lexicon, &rule.mode);

        report.verdicts.push(DetectorRecord {
            detector: KEYWORD_RULE.to_string(),
            verdict: if outcome.matched {
                DetectorVerdict::Fail
            } else {
                DetectorVerdict::Pass
            },
        });

        if !outcome.matched {
            return false;
        }
        tracing::debug!(comment_id = comment.id, keyword = ?outcome.first_hit, "Keyword lexicon hit");

        match rule.mode {
            KeywordMode::Flag => {
                self.block(comment, KEYWORD_RULE, report).await;
                false
            }
            KeywordMode::Redact { .. } => {
                // A reviewer will see the original text.
                if comment.is_pending {
                    tracing::debug!(comment_id = comment.id, "Skipping keyword redaction for pending comment");
                    return false;
                }

                tracing::info!(
                    comment_id = comment.id,
                    "Keyword redaction: {:?} -> {:?}",
                    comment.content,
                    outcome.content
                );
                comment.content = outcome.content;
                if let Err(e) = self.store.update_comment(comment).await {
                    tracing::error!(comment_id = comment.id, "Failed to save redacted comment: {}", e);
                    report.persist_failures += 1;
                }
                true
            }
        }
    }

    async fn build_context(&self, comment: &Comment, request: &RequestMeta) -> ModerationContext {
        let user = match self.store.fetch_user_for_comment(comment).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(comment_id = comment.id, "Failed to fetch comment author: {}", e);
                Default::default()
            }
        };

        ModerationContext {
            site_url: self.resolve_site_url(comment, request).await,
            ip: request.ip.clone().unwrap_or_else(|| comment.ip.clone()),
            user_agent: request
                .user_agent
                .clone()
                .unwrap_or_else(|| comment.user_agent.clone()),
            author_name: user.name,
            author_email: user.email,
        }
    }

    /// Prefer the site's primary URL, else the referer's origin, else empty.
    async fn resolve_site_url(&self, comment: &Comment, request: &RequestMeta) -> String {
        let mut site_url = String::new();

        if !comment.site_name.is_empty() {
            match self.store.find_site(&comment.site_name).await {
                Ok(Some(site)) => site_url = site.first_url(),
                Ok(None) => {
                    tracing::debug!(site = %comment.site_name, "Site not found for comment");
                }
                Err(e) => {
                    tracing::warn!(site = %comment.site_name, "Failed to look up site: {}", e);
                }
            }
        }

        if site_url.is_empty() {
            if let Some(origin) = request.referer.as_deref().and_then(origin_from_referer) {
                site_url = origin;
            }
        }

        site_url
    }
}

/// `scheme://host[:port]` of a referer, or `None` if it does not parse or lacks a host.
pub fn origin_from_referer(referer: &str) -> Option<String> {
    let parsed = Url::parse(referer).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    let scheme = parsed.scheme();
    if scheme.is_empty() {
        return None;
    }

    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    })
}

// ============================================================================
// TESTS
// ============================================================================
