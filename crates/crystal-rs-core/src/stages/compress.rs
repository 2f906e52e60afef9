//! Extractive compression: keep the most informative sentences.

use super::Compressor;
use super::text::{Segment, estimate_tokens, split_segments, split_sentences};
use crate::error::{StageError, StageKind};
use async_trait::async_trait;
use crystal_rs_protocol::{CompressionConfig, CompressionResult, Conversation, ExtractedFact};
use log::debug;
use regex::Regex;
use std::collections::HashSet;

const URL_PATTERN: &str = r#"https?://[^\s<>()\[\]"'`]+"#;

/// Deterministic compressor that selects whole sentences by score.
///
/// Sentences are ranked by length, figures, code, questions and message
/// recency, then taken best-first until the kept tokens reach
/// `compression_ratio` of the original. Output keeps transcript order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveCompressor;

#[derive(Debug)]
struct Unit<'a> {
    message_index: usize,
    position: usize,
    text: &'a str,
    is_code: bool,
    score: f64,
    tokens: u64,
}

#[async_trait]
impl Compressor for ExtractiveCompressor {
    async fn compress(
        &self,
        conversation: &Conversation,
        config: &CompressionConfig,
    ) -> Result<CompressionResult, StageError> {
        config
            .validate()
            .map_err(|err| StageError::new(StageKind::Compress, err.to_string()))?;
        let url_pattern = Regex::new(URL_PATTERN)
            .map_err(|err| StageError::new(StageKind::Compress, err.to_string()))?;

        let original_tokens = estimate_tokens(&conversation.transcript());
        let units = collect_units(conversation);
        if units.is_empty() {
            return Err(StageError::new(
                StageKind::Compress,
                "conversation has no content to compress",
            ));
        }

        let budget = (config.compression_ratio * original_tokens as f64).ceil() as u64;
        let mut ranked: Vec<&Unit<'_>> = units.iter().collect();
        ranked.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.position.cmp(&right.position))
        });

        let mut kept = HashSet::new();
        let mut kept_tokens = 0u64;
        if config.preserve_code_blocks {
            for unit in units.iter().filter(|unit| unit.is_code) {
                kept.insert(unit.position);
                kept_tokens += unit.tokens;
            }
        }
        for unit in ranked {
            if kept_tokens >= budget && !kept.is_empty() {
                break;
            }
            if kept.insert(unit.position) {
                kept_tokens += unit.tokens;
            }
        }

        let compressed_content = render(conversation, &units, &kept);
        let compressed_tokens = estimate_tokens(&compressed_content);
        let compression_ratio = if original_tokens == 0 {
            1.0
        } else {
            compressed_tokens as f64 / original_tokens as f64
        };
        debug!(
            "compressed conversation (id={}, units={}, kept={}, original_tokens={}, compressed_tokens={})",
            conversation.id,
            units.len(),
            kept.len(),
            original_tokens,
            compressed_tokens
        );
        Ok(CompressionResult {
            compressed_content,
            original_token_count: original_tokens,
            compressed_token_count: compressed_tokens,
            compression_ratio,
            extracted_facts: extract_facts(&units, &url_pattern),
        })
    }
}

fn collect_units(conversation: &Conversation) -> Vec<Unit<'_>> {
    let total = conversation.messages.len().max(1) as f64;
    let mut units = Vec::new();
    for (message_index, message) in conversation.messages.iter().enumerate() {
        let recency = (message_index + 1) as f64 / total;
        for segment in split_segments(&message.content) {
            let pieces = match segment {
                Segment::Code(code) => vec![(code, true)],
                Segment::Prose(prose) => split_sentences(prose)
                    .into_iter()
                    .map(|sentence| (sentence, false))
                    .collect(),
            };
            for (text, is_code) in pieces {
                let position = units.len();
                units.push(Unit {
                    message_index,
                    position,
                    text,
                    is_code,
                    score: score(text, is_code, recency),
                    tokens: estimate_tokens(text),
                });
            }
        }
    }
    units
}

fn score(text: &str, is_code: bool, recency: f64) -> f64 {
    let words = text.split_whitespace().count().min(30) as f64 / 30.0;
    let mut score = 1.0 + words + 0.5 * recency;
    if text.chars().any(|ch| ch.is_ascii_digit()) {
        score += 0.5;
    }
    if is_code {
        score += 1.0;
    }
    if text.ends_with('?') {
        score += 0.3;
    }
    score
}

/// Kept units as `role: text` lines, one per message with kept content.
fn render(conversation: &Conversation, units: &[Unit<'_>], kept: &HashSet<usize>) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current: Option<(usize, Vec<&str>)> = None;
    for unit in units.iter().filter(|unit| kept.contains(&unit.position)) {
        match current.as_mut() {
            Some((index, parts)) if *index == unit.message_index => parts.push(unit.text),
            _ => {
                if let Some((index, parts)) = current.take() {
                    lines.push(render_line(conversation, index, &parts));
                }
                current = Some((unit.message_index, vec![unit.text]));
            }
        }
    }
    if let Some((index, parts)) = current {
        lines.push(render_line(conversation, index, &parts));
    }
    lines.join("\n")
}

fn render_line(conversation: &Conversation, index: usize, parts: &[&str]) -> String {
    format!("{}: {}", conversation.messages[index].role, parts.join(" "))
}

fn extract_facts(units: &[Unit<'_>], url_pattern: &Regex) -> Vec<ExtractedFact> {
    let mut seen = HashSet::new();
    let mut facts = Vec::new();
    let mut push = |kind: &str, content: &str, message_index: usize| {
        if seen.insert((kind.to_string(), content.to_string())) {
            facts.push(ExtractedFact {
                kind: kind.to_string(),
                content: content.to_string(),
                message_index,
            });
        }
    };
    for unit in units {
        if unit.is_code {
            push("code", unit.text, unit.message_index);
            continue;
        }
        for url in url_pattern.find_iter(unit.text) {
            push("url", url.as_str().trim_end_matches(['.', ',', ';', ':']), unit.message_index);
        }
        if unit.text.chars().any(|ch| ch.is_ascii_digit()) {
            push("figure", unit.text, unit.message_index);
        }
    }
    facts
}
