//! The validated result of one analysis run.
//!
//! Field names serialise in camelCase so the JSON emitted by the CLI has the
//! same shape the provider was asked to produce (see [`crate::prompts`]).
//! Instances are only ever created by [`crate::pipeline::validate`], which
//! guarantees every enumerated field holds one of its declared values.

use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured summary of a blood report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Blood type, when the report states one (e.g. "O+").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,

    /// Observations in display order.
    pub key_findings: Vec<String>,

    /// Supplement suggestions in display order.
    pub supplements: Vec<Supplement>,

    pub health_status: HealthStatus,

    pub summary: String,
}

/// One supplement recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Supplement {
    pub name: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    pub priority: Priority,
}

/// Recommendation urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Wire values, in schema order.
    pub const ALLOWED: &'static str = "high, medium, low";

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Strict, case-sensitive parse of a wire value.
    pub fn parse(s: &str) -> Option<Self> {
        from_wire(s)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall assessment of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Good,
    Attention,
    Concern,
}

impl HealthStatus {
    /// Wire values, in schema order.
    pub const ALLOWED: &'static str = "good, attention, concern";

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Good => "good",
            HealthStatus::Attention => "attention",
            HealthStatus::Concern => "concern",
        }
    }

    /// Strict, case-sensitive parse of a wire value.
    pub fn parse(s: &str) -> Option<Self> {
        from_wire(s)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize a unit variant by its serde name.
fn from_wire<'de, T: Deserialize<'de>>(s: &'de str) -> Option<T> {
    let de: StrDeserializer<'de, ValueError> = s.into_deserializer();
    T::deserialize(de).ok()
}
