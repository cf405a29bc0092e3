//! Opt-out classification stage.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::config::OptOutConfig;
use crate::message::{Message, OptOutMetadata};

use super::{Middleware, MiddlewareError};

/// Flags inbound messages whose content matches a configured opt-out
/// keyword.
///
/// Classification is a pure function of the content and this stage's
/// configuration: content is trimmed, casing applied per config, and the
/// result written into the `optout` namespace. No external I/O.
pub struct OptOutMiddleware {
    case_sensitive: bool,
    keywords: HashSet<String>,
}

impl OptOutMiddleware {
    pub fn new(config: &OptOutConfig) -> Self {
        let case_sensitive = config.case_sensitive;
        let casing = |word: &String| {
            if case_sensitive {
                word.clone()
            } else {
                word.to_lowercase()
            }
        };
        Self {
            case_sensitive,
            keywords: config.keywords.iter().map(casing).collect(),
        }
    }

    fn casing(&self, word: &str) -> String {
        if self.case_sensitive {
            word.to_string()
        } else {
            word.to_lowercase()
        }
    }

    /// Classify `content` against the configured keyword set.
    pub fn classify(&self, content: Option<&str>) -> OptOutMetadata {
        let keyword = self.casing(content.unwrap_or("").trim());
        if self.keywords.contains(&keyword) {
            OptOutMetadata {
                optout: true,
                optout_keyword: Some(keyword),
            }
        } else {
            OptOutMetadata {
                optout: false,
                optout_keyword: None,
            }
        }
    }
}

#[async_trait]
impl Middleware for OptOutMiddleware {
    fn name(&self) -> &'static str {
        "optout"
    }

    async fn handle_inbound(&self, mut message: Message) -> Result<Message, MiddlewareError> {
        message.helper_metadata.optout = Some(self.classify(message.content.as_deref()));
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Direction;

    fn config(case_sensitive: bool, keywords: &[&str]) -> OptOutConfig {
        OptOutConfig {
            case_sensitive,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_classify_is_deterministic() {
        let mw = OptOutMiddleware::new(&config(false, &["stop", "end"]));
        for _ in 0..3 {
            let meta = mw.classify(Some("STOP"));
            assert!(meta.optout);
            assert_eq!(meta.optout_keyword.as_deref(), Some("stop"));
        }
    }

    #[test]
    fn test_classify_trims_whitespace() {
        let mw = OptOutMiddleware::new(&config(false, &["stop"]));
        assert!(mw.classify(Some("  stop \n")).optout);
    }

    #[test]
    fn test_classify_case_sensitive() {
        let mw = OptOutMiddleware::new(&config(true, &["STOP"]));
        assert!(mw.classify(Some("STOP")).optout);
        assert!(!mw.classify(Some("stop")).optout);
    }

    #[test]
    fn test_classify_no_match() {
        let mw = OptOutMiddleware::new(&config(false, &["stop"]));
        let meta = mw.classify(Some("hello"));
        assert!(!meta.optout);
        assert_eq!(meta.optout_keyword, None);
    }

    #[test]
    fn test_classify_empty_content() {
        let mw = OptOutMiddleware::new(&config(false, &["stop"]));
        assert!(!mw.classify(None).optout);
        assert!(!mw.classify(Some("")).optout);
    }

    #[tokio::test]
    async fn test_inbound_writes_optout_namespace() {
        let mw = OptOutMiddleware::new(&config(false, &["stop"]));
        let msg = Message::new("a", "b", Some("Stop".into()), Direction::Inbound);
        let out = mw.handle_inbound(msg).await.unwrap();
        assert!(out.is_opt_out());
        assert_eq!(
            out.helper_metadata.optout.unwrap().optout_keyword.as_deref(),
            Some("stop")
        );
    }

    #[tokio::test]
    async fn test_outbound_is_untouched() {
        let mw = OptOutMiddleware::new(&config(false, &["stop"]));
        let msg = Message::new("a", "b", Some("stop".into()), Direction::Outbound);
        let out = mw.handle_outbound(msg).await.unwrap();
        assert!(out.helper_metadata.optout.is_none());
    }
}
