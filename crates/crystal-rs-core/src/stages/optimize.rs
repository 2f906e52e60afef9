//! Template-based prompt assembly.

use super::text::{content_words, estimate_tokens};
use super::{OptimizeOptions, Optimizer};
use crate::error::StageError;
use async_trait::async_trait;
use crystal_rs_protocol::{PromptOutput, VerificationResult};
use log::debug;
use std::collections::{BTreeMap, HashSet};

/// Technique used when grounding is weak.
pub const RETRIEVAL_AUGMENTED: &str = "retrieval_augmented";
/// Technique used when grounding is strong.
pub const CHAIN_OF_THOUGHT: &str = "chain_of_thought";
/// Input price assumed for cost estimates, in USD per 1K tokens.
const INPUT_COST_PER_1K_TOKENS: f64 = 0.003;

const ROLE_SECTION: &str =
    "You are continuing a conversation that was condensed from an earlier session.";

/// Optimizer that fills a fixed section template.
///
/// Picks `retrieval_augmented` below the grounding threshold and
/// `chain_of_thought` otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TemplateOptimizer {
    low_grounding_threshold: f64,
}

impl TemplateOptimizer {
    pub fn new(low_grounding_threshold: f64) -> Self {
        Self {
            low_grounding_threshold,
        }
    }

    pub fn technique_for(&self, grounding_score: f64) -> &'static str {
        if grounding_score < self.low_grounding_threshold {
            RETRIEVAL_AUGMENTED
        } else {
            CHAIN_OF_THOUGHT
        }
    }
}

fn instructions(technique: &str) -> &'static str {
    if technique == RETRIEVAL_AUGMENTED {
        "Treat the context as the only source of truth. Quote it when answering and say so when it does not cover a question."
    } else {
        "Reason step by step from the context before answering, and keep decisions already made consistent."
    }
}

#[async_trait]
impl Optimizer for TemplateOptimizer {
    async fn optimize(
        &self,
        verified_content: &str,
        verification: &VerificationResult,
        options: &OptimizeOptions,
    ) -> Result<PromptOutput, StageError> {
        let technique = self.technique_for(verification.grounding_score);
        let sections = [
            ("role", ROLE_SECTION.to_string()),
            ("context", verified_content.trim().to_string()),
            ("instructions", instructions(technique).to_string()),
            ("continuation", options.continuation_prompt.trim().to_string()),
        ];
        let final_prompt = sections
            .iter()
            .map(|(name, body)| format!("## {}\n{}", title_case(name), body))
            .collect::<Vec<_>>()
            .join("\n\n");
        let estimated_tokens = estimate_tokens(&final_prompt);

        let mut structure_breakdown: BTreeMap<String, String> = sections
            .into_iter()
            .map(|(name, body)| (name.to_string(), body))
            .collect();
        structure_breakdown.insert("technique".to_string(), technique.to_string());

        let words = content_words(verified_content);
        let distinct: HashSet<&String> = words.iter().collect();
        let information_density = if words.is_empty() {
            0.0
        } else {
            distinct.len() as f64 / words.len() as f64
        };
        let verified_claim_ratio = if verification.total_claims == 0 {
            1.0
        } else {
            verification.verified_claims as f64 / verification.total_claims as f64
        };
        let quality_metrics = BTreeMap::from([
            ("grounding_score".to_string(), verification.grounding_score),
            ("information_density".to_string(), information_density),
            ("verified_claim_ratio".to_string(), verified_claim_ratio),
        ]);

        let saved_tokens = options.original_tokens.saturating_sub(estimated_tokens);
        let cost_estimation = BTreeMap::from([
            (
                "estimated_input_cost_usd".to_string(),
                token_cost(estimated_tokens),
            ),
            ("estimated_savings_usd".to_string(), token_cost(saved_tokens)),
        ]);

        debug!("optimized prompt (technique={technique}, estimated_tokens={estimated_tokens})");
        Ok(PromptOutput {
            final_prompt,
            structure_breakdown,
            estimated_tokens,
            quality_metrics,
            cost_estimation,
        })
    }
}

fn token_cost(tokens: u64) -> f64 {
    tokens as f64 / 1000.0 * INPUT_COST_PER_1K_TOKENS
}

fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn verification(grounding_score: f64) -> VerificationResult {
        VerificationResult {
            verified_content: "user: Deploy on Friday.".to_string(),
            grounding_score,
            total_claims: 4,
            verified_claims: 3,
            corrections: Vec::new(),
            failed_verifications: Vec::new(),
        }
    }

    #[tokio::test]
    async fn switches_technique_on_grounding_threshold() {
        let optimizer = TemplateOptimizer::new(0.8);
        let options = OptimizeOptions::default();
        let weak = optimizer
            .optimize("user: Deploy on Friday.", &verification(0.5), &options)
            .await
            .expect("optimize");
        let strong = optimizer
            .optimize("user: Deploy on Friday.", &verification(0.8), &options)
            .await
            .expect("optimize");
        assert_eq!(weak.structure_breakdown["technique"], RETRIEVAL_AUGMENTED);
        assert_eq!(strong.structure_breakdown["technique"], CHAIN_OF_THOUGHT);
    }

    #[tokio::test]
    async fn prompt_carries_sections_and_metrics() {
        let options = OptimizeOptions {
            continuation_prompt: "Pick up where we left off.".to_string(),
            original_tokens: 1000,
        };
        let output = TemplateOptimizer::new(0.8)
            .optimize("user: Deploy on Friday.", &verification(0.9), &options)
            .await
            .expect("optimize");
        assert!(output.final_prompt.starts_with("## Role\n"));
        assert!(output.final_prompt.contains("## Context\nuser: Deploy on Friday."));
        assert!(output.final_prompt.ends_with("## Continuation\nPick up where we left off."));
        assert_eq!(output.estimated_tokens, estimate_tokens(&output.final_prompt));
        assert_eq!(output.quality_metrics["verified_claim_ratio"], 0.75);
        assert_eq!(output.quality_metrics["grounding_score"], 0.9);
        assert!(output.cost_estimation["estimated_savings_usd"] > 0.0);
    }
}
