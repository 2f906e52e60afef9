//! Lexical grounding check of compressed content.

use super::Verifier;
use super::text::{Segment, content_words, split_segments, split_sentences, vocabulary};
use crate::error::StageError;
use async_trait::async_trait;
use crystal_rs_protocol::{Correction, FailedVerification, Message, Role, VerificationResult};
use log::debug;
use std::collections::HashSet;

/// Share of a claim's content words that must occur in the source.
pub const DEFAULT_SUPPORT_THRESHOLD: f64 = 0.6;

/// Verifier that grounds each sentence by word overlap with the original.
///
/// Claims whose support falls below the threshold are removed from the
/// verified content and reported as failed verifications.
#[derive(Debug, Clone, Copy)]
pub struct LexicalVerifier {
    support_threshold: f64,
}

impl Default for LexicalVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORT_THRESHOLD)
    }
}

impl LexicalVerifier {
    pub fn new(support_threshold: f64) -> Self {
        Self {
            support_threshold: support_threshold.clamp(0.0, 1.0),
        }
    }
}

#[derive(Default)]
struct Tally {
    total: u64,
    verified: u64,
    corrections: Vec<Correction>,
    failed: Vec<FailedVerification>,
}

impl LexicalVerifier {
    fn check(&self, claim: &str, source: &HashSet<String>, tally: &mut Tally) -> bool {
        let words = content_words(claim);
        tally.total += 1;
        let support = if words.is_empty() {
            1.0
        } else {
            let found = words.iter().filter(|word| source.contains(*word)).count();
            found as f64 / words.len() as f64
        };
        if support >= self.support_threshold {
            tally.verified += 1;
            return true;
        }
        tally.failed.push(FailedVerification {
            claim: claim.to_string(),
            reason: format!(
                "only {:.0}% of terms appear in the original conversation",
                support * 100.0
            ),
            support,
        });
        tally.corrections.push(Correction {
            claim: claim.to_string(),
            action: "removed".to_string(),
        });
        false
    }
}

#[async_trait]
impl Verifier for LexicalVerifier {
    async fn verify(
        &self,
        compressed_content: &str,
        original: &[Message],
    ) -> Result<VerificationResult, StageError> {
        let source = vocabulary(original.iter().map(|message| message.content.as_str()));
        let original_text: Vec<&str> = original.iter().map(|m| m.content.as_str()).collect();
        let mut tally = Tally::default();
        let mut lines: Vec<String> = Vec::new();
        // Role marker not yet attached to a kept line; survives fence boundaries.
        let mut pending_prefix = "";

        for segment in split_segments(compressed_content) {
            match segment {
                Segment::Code(code) => {
                    let verbatim = original_text.iter().any(|text| text.contains(code));
                    let kept = if verbatim {
                        tally.total += 1;
                        tally.verified += 1;
                        true
                    } else {
                        self.check(code, &source, &mut tally)
                    };
                    if kept {
                        lines.push(format!("{pending_prefix}{code}"));
                        pending_prefix = "";
                    }
                }
                Segment::Prose(prose) => {
                    for line in prose.lines() {
                        let (prefix, body) = split_role_prefix(line);
                        if !prefix.is_empty() {
                            pending_prefix = prefix;
                        }
                        let kept: Vec<&str> = split_sentences(body)
                            .into_iter()
                            .filter(|claim| self.check(claim, &source, &mut tally))
                            .collect();
                        if !kept.is_empty() {
                            lines.push(format!("{pending_prefix}{}", kept.join(" ")));
                            pending_prefix = "";
                        }
                    }
                }
            }
        }

        let grounding_score = if tally.total == 0 {
            1.0
        } else {
            tally.verified as f64 / tally.total as f64
        };
        debug!(
            "verified compressed content (claims={}, verified={}, grounding_score={:.2})",
            tally.total, tally.verified, grounding_score
        );
        Ok(VerificationResult {
            verified_content: lines.join("\n"),
            grounding_score,
            total_claims: tally.total,
            verified_claims: tally.verified,
            corrections: tally.corrections,
            failed_verifications: tally.failed,
        })
    }
}

/// Split a leading `role: ` marker off a transcript line.
fn split_role_prefix(line: &str) -> (&str, &str) {
    if let Some((head, _)) = line.split_once(": ")
        && head.parse::<Role>().is_ok()
    {
        let cut = head.len() + 2;
        return (&line[..cut], &line[cut..]);
    }
    ("", line)
}

#[cfg(test)]
mod tests {
    use super::LexicalVerifier;
    use crate::stages::Verifier;
    use crystal_rs_protocol::{Message, Role};
    use pretty_assertions::assert_eq;

    fn original() -> Vec<Message> {
        vec![
            Message::new(Role::User, "The cluster runs three replicas in Frankfurt.", 1.0, None),
            Message::new(
                Role::Assistant,
                "Restart the deployment.\n```sh\nkubectl rollout restart deploy/api\n```",
                2.0,
                None,
            ),
        ]
    }

    #[tokio::test]
    async fn removes_ungrounded_claims() {
        let compressed = "user: The cluster runs three replicas in Frankfurt. Pricing doubled overnight unexpectedly.\nassistant: Restart the deployment.";
        let result = LexicalVerifier::default()
            .verify(compressed, &original())
            .await
            .expect("verify");
        assert_eq!(result.total_claims, 3);
        assert_eq!(result.verified_claims, 2);
        assert_eq!(
            result.verified_content,
            "user: The cluster runs three replicas in Frankfurt.\nassistant: Restart the deployment."
        );
        assert_eq!(result.failed_verifications.len(), 1);
        assert_eq!(
            result.failed_verifications[0].claim,
            "Pricing doubled overnight unexpectedly."
        );
        assert_eq!(result.corrections[0].action, "removed");
        assert!((result.grounding_score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn verbatim_code_blocks_are_grounded() {
        let compressed = "assistant: ```sh\nkubectl rollout restart deploy/api\n```";
        let result = LexicalVerifier::default()
            .verify(compressed, &original())
            .await
            .expect("verify");
        assert_eq!(result.grounding_score, 1.0);
        assert!(result.verified_content.contains("kubectl rollout restart"));
    }

    #[tokio::test]
    async fn role_marker_follows_a_leading_code_block() {
        let original = vec![
            Message::new(Role::User, "How do I restart the api?", 1.0, None),
            Message::new(
                Role::Assistant,
                "```sh\nkubectl rollout restart deploy/api\n``` That restarts every pod.",
                2.0,
                None,
            ),
        ];
        let compressed = "user: How do I restart the api?\nassistant: ```sh\nkubectl rollout restart deploy/api\n``` That restarts every pod.";
        let result = LexicalVerifier::default()
            .verify(compressed, &original)
            .await
            .expect("verify");
        assert_eq!(
            result.verified_content,
            "user: How do I restart the api?\nassistant: ```sh\nkubectl rollout restart deploy/api\n```\nThat restarts every pod."
        );
        assert_eq!(result.grounding_score, 1.0);
    }

    #[tokio::test]
    async fn role_marker_moves_to_first_kept_line() {
        let compressed = "user: The cluster runs three replicas in Frankfurt.\nassistant: Pricing doubled overnight unexpectedly.\nRestart the deployment.";
        let result = LexicalVerifier::default()
            .verify(compressed, &original())
            .await
            .expect("verify");
        assert_eq!(
            result.verified_content,
            "user: The cluster runs three replicas in Frankfurt.\nassistant: Restart the deployment."
        );
    }

    #[tokio::test]
    async fn empty_content_is_fully_grounded() {
        let result = LexicalVerifier::default()
            .verify("", &original())
            .await
            .expect("verify");
        assert_eq!(result.total_claims, 0);
        assert_eq!(result.grounding_score, 1.0);
    }
}
