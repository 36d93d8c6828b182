//! Transport seam for the AI collaborator.
//!
//! The pipeline treats the collaborator as a black box that answers with
//! raw text; parsing and degradation live in `crucible_common::ai` so a
//! misbehaving service can never break a compile job. Implementations of
//! the trait own the actual transport (HTTP client, credentials, model
//! selection) and are wired into `AppState` at startup.

use async_trait::async_trait;

use crucible_common::ai::{GenerateRequest, ReviewRequest};

#[async_trait]
pub trait SuggestionService: Send + Sync {
    /// Review code (optionally with compiler diagnostics) and return the
    /// collaborator's raw answer.
    async fn review(&self, request: &ReviewRequest) -> anyhow::Result<String>;

    /// Ask for replacement code and return the raw answer.
    async fn autofix(&self, code: &str) -> anyhow::Result<String>;

    /// Generate code from a prompt (optionally seeded with existing code)
    /// and return the raw answer.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_common::ai::{parse_generated, parse_replacement, parse_suggestions};

    struct CannedService {
        answer: &'static str,
    }

    #[async_trait]
    impl SuggestionService for CannedService {
        async fn review(&self, _request: &ReviewRequest) -> anyhow::Result<String> {
            Ok(self.answer.to_string())
        }

        async fn autofix(&self, _code: &str) -> anyhow::Result<String> {
            Ok(self.answer.to_string())
        }

        async fn generate(&self, _request: &GenerateRequest) -> anyhow::Result<String> {
            Ok(self.answer.to_string())
        }
    }

    #[tokio::test]
    async fn malformed_collaborator_answers_degrade() {
        let service = CannedService {
            answer: "Sorry, I cannot help with that.",
        };
        let raw = service
            .review(&ReviewRequest {
                code: "int main() {}".to_string(),
                compilation_error: None,
            })
            .await
            .unwrap();
        assert!(parse_suggestions(&raw).is_empty());

        let raw = service.autofix("int main() {}").await.unwrap();
        assert_eq!(parse_replacement(&raw, "int main() {}"), "int main() {}");

        // Generation has no original to fall back to; the raw answer
        // becomes the code.
        let raw = service
            .generate(&GenerateRequest {
                prompt: "write hello world".to_string(),
                context: None,
            })
            .await
            .unwrap();
        assert_eq!(parse_generated(&raw).code, "Sorry, I cannot help with that.");
    }
}
