// Moderation infra layer.
// - one client per external detector
// - `file_lexicon_source.rs` reads keyword files
// - `sqlite_comment_store.rs` persists comments, users and sites

pub mod akismet_client;
pub mod aliyun_client;
pub mod file_lexicon_source;
mod signing;
pub mod sqlite_comment_store;
pub mod tencent_client;

pub use akismet_client::AkismetClient;
pub use aliyun_client::AliyunClient;
pub use file_lexicon_source::FileLexiconSource;
pub use sqlite_comment_store::SqliteCommentStore;
pub use tencent_client::TencentClient;

use crate::core::moderation::{
    CommentStore, Detector, DetectorError, KeywordLexicon, LexiconSource, ModerationService,
    ModeratorConfig,
};

/// Enabled detectors in priority order: Akismet, Tencent Cloud, Aliyun.
pub fn build_detectors(config: &ModeratorConfig) -> Result<Vec<Box<dyn Detector>>, DetectorError> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();

    if !config.akismet.api_key.trim().is_empty() {
        detectors.push(Box::new(AkismetClient::new(
            config.akismet.api_key.clone(),
            config.detector_timeout,
        )?));
    }

    if config.tencent.enabled {
        detectors.push(Box::new(TencentClient::new(
            &config.tencent,
            config.detector_timeout,
        )?));
    }

    if config.aliyun.enabled {
        detectors.push(Box::new(AliyunClient::new(
            &config.aliyun,
            config.detector_timeout,
        )?));
    }

    Ok(detectors)
}

/// Wire a moderation service from configuration.
pub fn build_service<S: CommentStore>(
    store: S,
    config: &ModeratorConfig,
) -> Result<ModerationService<S>, DetectorError> {
    let mut service = ModerationService::new(store, config.api_fail_block);

    for detector in build_detectors(config)? {
        service = service.with_detector(detector);
    }

    if config.keywords.enabled {
        let lexicon = KeywordLexicon::new(
            Box::new(FileLexiconSource) as Box<dyn LexiconSource>,
            config.keywords.files.clone(),
            config.keywords.separator.clone(),
        );
        service = service.with_keyword_filter(lexicon, config.keywords.mode.clone());
    }

    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{AkismetConfig, AliyunConfig, TencentConfig};

    #[test]
    fn no_detectors_when_nothing_is_configured() {
        let detectors = build_detectors(&ModeratorConfig::default()).unwrap();
        assert!(detectors.is_empty());
    }

    #[test]
    fn detectors_follow_priority_order() {
        let config = ModeratorConfig {
            akismet: AkismetConfig {
                api_key: "key".to_string(),
            },
            tencent: TencentConfig {
                enabled: true,
                ..Default::default()
            },
            aliyun: AliyunConfig {
                enabled: true,
                region: "cn-shanghai".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let names: Vec<String> = build_detectors(&config)
            .unwrap()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["Akismet", "Tencent Cloud", "Aliyun"]);
    }

    #[test]
    fn blank_akismet_key_disables_akismet() {
        let config = ModeratorConfig {
            akismet: AkismetConfig {
                api_key: "   ".to_string(),
            },
            ..Default::default()
        };
        assert!(build_detectors(&config).unwrap().is_empty());
    }
}
