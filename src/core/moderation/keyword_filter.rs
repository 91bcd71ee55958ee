// Keyword filter - applies the lexicon to comment content.
//
// Pure string logic, no I/O. The orchestrator decides what to do with the result.

use super::moderation_models::KeywordMode;

/// Result of running the filter over one piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// The content after filtering. Identical to the input in flag mode.
    pub content: String,
    pub matched: bool,
    /// The first keyword that hit, for logging.
    pub first_hit: Option<String>,
}

/// Scan `content` for every keyword in `lexicon`.
///
/// Flag mode stops at the first keyword found and leaves content unchanged.
/// Redact mode keeps going over the whole lexicon, replacing every occurrence
/// of every hit with the filler repeated once per character of the keyword, so
/// the visual width survives for multi-byte text. With an empty filler nothing
/// can be replaced and the outcome is unmatched.
pub fn filter(content: &str, lexicon: &[String], mode: &KeywordMode) -> FilterOutcome {
    match mode {
        KeywordMode::Flag => {
            let hit = lexicon
                .iter()
                .find(|keyword| !keyword.is_empty() && content.contains(keyword.as_str()));

            FilterOutcome {
                content: content.to_string(),
                matched: hit.is_some(),
                first_hit: hit.cloned(),
            }
        }
        KeywordMode::Redact { filler } => {
            let mut handled = content.to_string();
            let mut first_hit = None;

            if !filler.is_empty() {
                for keyword in lexicon {
                    if keyword.is_empty() || !handled.contains(keyword.as_str()) {
                        continue;
                    }

                    let mask = filler.repeat(keyword.chars().count());
                    handled = handled.replace(keyword.as_str(), &mask);
                    first_hit.get_or_insert_with(|| keyword.clone());
                }
            }

            FilterOutcome {
                matched: first_hit.is_some(),
                content: handled,
                first_hit,
            }
        }
    }
}
