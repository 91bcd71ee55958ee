use crate::core::moderation::{LexiconError, LexiconSource};
use async_trait::async_trait;
use std::path::Path;

/// Reads keyword files from the local filesystem.
pub struct FileLexiconSource;

#[async_trait]
impl LexiconSource for FileLexiconSource {
    async fn read(&self, location: &Path) -> Result<String, LexiconError> {
        let bytes = tokio::fs::read(location)
            .await
            .map_err(|source| LexiconError::SourceUnreadable {
                location: location.display().to_string(),
                source,
            })?;

        // A stray bad byte only spoils the keyword it sits in.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::KeywordLexicon;
    use std::io::Write;

    #[tokio::test]
    async fn loads_readable_files_and_skips_missing_ones() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "foo, bar").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");

        let lexicon = KeywordLexicon::new(
            FileLexiconSource,
            vec![file.path().to_path_buf(), missing],
            ",",
        );

        assert_eq!(lexicon.keywords().await, ["foo", "bar"]);
    }

    #[tokio::test]
    async fn invalid_utf8_keeps_the_valid_keywords() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"foo\nb\xffd\nbar\n").unwrap();

        let lexicon = KeywordLexicon::new(FileLexiconSource, vec![file.path().to_path_buf()], "\n");
        let keywords = lexicon.keywords().await;

        assert_eq!(keywords.len(), 3);
        assert_eq!(keywords[0], "foo");
        assert_eq!(keywords[2], "bar");
    }

    #[tokio::test]
    async fn missing_file_reports_its_location() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("keywords.txt");

        let err = FileLexiconSource.read(&missing).await.unwrap_err();
        assert!(err.to_string().contains("keywords.txt"));
    }
}
