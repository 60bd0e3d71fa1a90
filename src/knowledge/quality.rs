//! Quality scoring.
//!
//! `quality = w_rel·reliability(source) + w_rec·recency + w_use·usage + w_ver·verified`,
//! clamped to `[0, 1]`. Weights, the source reliability table, and the recency
//! and usage curves come from the `[knowledge]` config section.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::KnowledgeConfig;
use crate::knowledge::types::RecordMetadata;

/// Per-factor contributions, before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityBreakdown {
    pub reliability: f64,
    pub recency: f64,
    pub usage: f64,
    pub verification: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    reliability_weight: f64,
    recency_weight: f64,
    usage_weight: f64,
    verification_weight: f64,
    recency_horizon_days: f64,
    recency_floor: f64,
    usage_saturation: f64,
    default_reliability: f64,
    source_reliability: HashMap<String, f64>,
}

impl QualityScorer {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            reliability_weight: config.reliability_weight,
            recency_weight: config.recency_weight,
            usage_weight: config.usage_weight,
            verification_weight: config.verification_weight,
            recency_horizon_days: config.recency_horizon_days.max(1) as f64,
            recency_floor: config.recency_floor.clamp(0.0, 1.0),
            usage_saturation: if config.usage_saturation > 0.0 {
                config.usage_saturation
            } else {
                1.0
            },
            default_reliability: config.default_reliability.clamp(0.0, 1.0),
            source_reliability: config.source_reliability.clone(),
        }
    }

    /// Reliability of a provenance string.
    ///
    /// Tries the whole string, then the part before `@`, then the part before
    /// the first `:`; e.g. `harvester:docs.example.com@2026-03-01T00:00:00Z`
    /// resolves through `harvester`.
    pub fn reliability(&self, source: &str) -> f64 {
        let source = source.trim();
        let without_stamp = source.split('@').next().unwrap_or(source);
        let name = without_stamp.split(':').next().unwrap_or(without_stamp);

        [source, without_stamp, name]
            .into_iter()
            .find_map(|key| self.source_reliability.get(key))
            .copied()
            .unwrap_or(self.default_reliability)
            .clamp(0.0, 1.0)
    }

    /// Linear decay from 1.0 at `updated_at` to the floor at the horizon.
    pub fn recency(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - updated_at).num_seconds().max(0) as f64 / 86_400.0;
        let progress = (age_days / self.recency_horizon_days).min(1.0);
        1.0 - (1.0 - self.recency_floor) * progress
    }

    /// Saturating usage curve: `1 − e^(−n / saturation)`.
    pub fn usage(&self, usage_count: u64) -> f64 {
        1.0 - (-(usage_count as f64) / self.usage_saturation).exp()
    }

    pub fn breakdown(&self, metadata: &RecordMetadata, now: DateTime<Utc>) -> QualityBreakdown {
        let reliability = self.reliability(&metadata.source);
        let recency = self.recency(metadata.updated_at, now);
        let usage = self.usage(metadata.usage_count);
        let verification = if metadata.verified { 1.0 } else { 0.0 };

        let total = self.reliability_weight * reliability
            + self.recency_weight * recency
            + self.usage_weight * usage
            + self.verification_weight * verification;

        QualityBreakdown {
            reliability,
            recency,
            usage,
            verification,
            total: if total.is_finite() {
                total.clamp(0.0, 1.0)
            } else {
                0.0
            },
        }
    }

    pub fn score(&self, metadata: &RecordMetadata, now: DateTime<Utc>) -> f64 {
        self.breakdown(metadata, now).total
    }
}
