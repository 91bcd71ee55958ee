// Core moderation module - the comment moderation pipeline.
// Ports (CommentStore, Detector, LexiconSource) are implemented in infra/moderation.

pub mod comment_store;
pub mod detector;
pub mod keyword_filter;
pub mod lexicon;
pub mod moderation_models;
pub mod moderation_queue;
pub mod moderation_service;

pub use comment_store::{CommentStore, StoreError};
pub use detector::{Detector, DetectorError};
pub use lexicon::{KeywordLexicon, LexiconError, LexiconSource};
pub use moderation_models::*;
pub use moderation_queue::{ModerationJob, ModerationQueue};
pub use moderation_service::ModerationService;
