// Keyword lexicon cache.
//
// Loaded lazily on first use, exactly once, then shared by every moderation
// pass for the lifetime of the owning service. A source that fails to load is
// logged and skipped; it is not retried on later calls.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Keyword source {location} could not be read: {source}")]
    SourceUnreadable {
        location: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where lexicon text comes from.
#[async_trait]
pub trait LexiconSource: Send + Sync {
    /// Read the full text stored at `location`.
    async fn read(&self, location: &Path) -> Result<String, LexiconError>;
}

#[async_trait]
impl LexiconSource for Box<dyn LexiconSource> {
    async fn read(&self, location: &Path) -> Result<String, LexiconError> {
        (**self).read(location).await
    }
}

/// Split `text` on `separator`, trim every token and drop the empty ones.
pub fn split_and_trim(text: &str, separator: &str) -> Vec<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct KeywordLexicon<L: LexiconSource> {
    source: L,
    locations: Vec<PathBuf>,
    separator: String,
    keywords: OnceCell<Vec<String>>,
}

impl<L: LexiconSource> KeywordLexicon<L> {
    pub fn new(source: L, locations: Vec<PathBuf>, separator: impl Into<String>) -> Self {
        Self {
            source,
            locations,
            separator: separator.into(),
            keywords: OnceCell::new(),
        }
    }

    /// The keyword list, loading it on the first call.
    ///
    /// Concurrent first callers wait on the same load; only one load pass
    /// ever runs. The result is cached even when it is empty or partial.
    pub async fn keywords(&self) -> &[String] {
        self.keywords.get_or_init(|| self.load()).await.as_slice()
    }

    async fn load(&self) -> Vec<String> {
        let mut keywords = Vec::new();

        for location in &self.locations {
            match self.source.read(location).await {
                Ok(text) => {
                    let found = split_and_trim(&text, &self.separator);
                    tracing::debug!(
                        location = %location.display(),
                        count = found.len(),
                        "Loaded keyword source"
                    );
                    keywords.extend(found);
                }
                Err(e) => {
                    tracing::error!(location = %location.display(), "Keyword source failed to load: {}", e);
                }
            }
        }

        tracing::info!(count = keywords.len(), "Keyword lexicon ready");
        keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Serves text from memory and counts reads. Missing entries are unreadable.
    struct MemorySource {
        files: DashMap<PathBuf, String>,
        reads: AtomicUsize,
    }

    impl MemorySource {
        fn new(files: &[(&str, &str)]) -> Self {
            let map = DashMap::new();
            for (path, text) in files {
                map.insert(PathBuf::from(path), text.to_string());
            }
            Self {
                files: map,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LexiconSource for MemorySource {
        async fn read(&self, location: &Path) -> Result<String, LexiconError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            // Widen the window for concurrent first callers.
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.files
                .get(location)
                .map(|text| text.clone())
                .ok_or_else(|| LexiconError::SourceUnreadable {
                    location: location.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
        }
    }

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn split_and_trim_drops_blank_tokens() {
        assert_eq!(
            split_and_trim(" foo ,, bar ,\n", ","),
            vec!["foo".to_string(), "bar".to_string()]
        );
        assert!(split_and_trim("   ", "\n").is_empty());
    }

    #[tokio::test]
    async fn unreadable_source_is_skipped() {
        let source = MemorySource::new(&[("good.txt", "foo, bar")]);
        let lexicon = KeywordLexicon::new(source, paths(&["good.txt", "missing.txt"]), ",");

        assert_eq!(lexicon.keywords().await, ["foo", "bar"]);
    }

    #[tokio::test]
    async fn source_order_is_preserved() {
        let source = MemorySource::new(&[("a.txt", "one\ntwo"), ("b.txt", "three")]);
        let lexicon = KeywordLexicon::new(source, paths(&["missing.txt", "b.txt", "a.txt"]), "\n");

        assert_eq!(lexicon.keywords().await, ["three", "one", "two"]);
    }

    #[tokio::test]
    async fn later_calls_use_the_cache() {
        let source = MemorySource::new(&[("good.txt", "foo")]);
        let lexicon = KeywordLexicon::new(source, paths(&["good.txt", "missing.txt"]), ",");

        lexicon.keywords().await;
        lexicon.keywords().await;

        // One read per source, the failed one is not retried.
        assert_eq!(lexicon.source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_result_is_still_cached() {
        let source = MemorySource::new(&[]);
        let lexicon = KeywordLexicon::new(source, paths(&["missing.txt"]), ",");

        assert!(lexicon.keywords().await.is_empty());
        assert!(lexicon.keywords().await.is_empty());
        assert_eq!(lexicon.source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_loads_once() {
        let source = MemorySource::new(&[("good.txt", "foo, bar")]);
        let lexicon = Arc::new(KeywordLexicon::new(
            source,
            paths(&["good.txt", "missing.txt"]),
            ",",
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let lexicon = Arc::clone(&lexicon);
            handles.push(tokio::spawn(async move { lexicon.keywords().await.to_vec() }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec!["foo".to_string(), "bar".to_string()]);
        }
        assert_eq!(lexicon.source.reads.load(Ordering::SeqCst), 2);
    }
}
