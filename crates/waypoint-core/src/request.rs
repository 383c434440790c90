//! The generation request model: what kind of artifact to produce, which
//! cache keys identify it, and the payload the prompt embeds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// The kind of artifact a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A short review-and-steps summary of an existing trip outline.
    Summary,
    /// A full structured itinerary extracted from a web page.
    Itinerary,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Summary => "summary",
            Self::Itinerary => "itinerary",
        };
        f.write_str(s)
    }
}

/// One generation request. Immutable once constructed.
///
/// `primary_key` identifies the shared cache tier (a language-agnostic
/// catalog identifier reusable across users); `secondary_key` identifies the
/// private tier (a specific trip or source URL). At least one must be
/// present.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: ArtifactKind,
    pub primary_key: Option<String>,
    pub secondary_key: Option<String>,
    /// Plain-text prompt payload: a flattened trip outline for `Summary`, a
    /// URL for `Itinerary`.
    pub payload: String,
    /// BCP-47-ish language code for the generated text (e.g. "fr", "en").
    pub language: String,
    /// Probe mode: check the cache without triggering generation or billing.
    pub cache_only: bool,
}

impl GenerationRequest {
    /// Fail fast on a request the pipeline cannot serve.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.primary_key.is_none() && self.secondary_key.is_none() {
            return Err(GenerationError::InvalidRequest(
                "a catalog or trip identifier is required".into(),
            ));
        }
        if self.payload.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("payload is empty".into()));
        }
        if self.kind == ArtifactKind::Itinerary {
            let url = self.payload.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GenerationError::InvalidRequest(
                    "payload must be an http(s) url".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Language suffixes stripped when normalizing a catalog identifier.
const LANG_SUFFIXES: &[&str] = &["fr", "en", "es", "it", "pt", "ar", "de"];

/// Strip a trailing `-fr` / `-en` / ... language suffix from a slug.
fn strip_lang_suffix(slug: &str) -> &str {
    if let Some((stem, tail)) = slug.rsplit_once('-') {
        if LANG_SUFFIXES.iter().any(|s| tail.eq_ignore_ascii_case(s)) {
            return stem;
        }
    }
    slug
}

/// Make a catalog identifier language-agnostic so every language variant of
/// the same content shares one cache entry.
///
/// Identifiers look like `FR_creuse-valley-fr`: an optional prefix segment
/// joined by `_`, then a slug with an optional language suffix. Idempotent.
pub fn normalize_catalog_key(raw: &str) -> String {
    match raw.split_once('_') {
        Some((prefix, rest)) => format!("{prefix}_{}", strip_lang_suffix(rest)),
        None => strip_lang_suffix(raw).to_string(),
    }
}

/// One stop of a structured trip outline, as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineStop {
    #[serde(default)]
    pub name: Option<String>,
    /// Nights spent here; zero marks a pass-through.
    #[serde(default)]
    pub nights: u32,
    #[serde(default)]
    pub visits: Vec<OutlineNote>,
    #[serde(default)]
    pub activities: Vec<OutlineNote>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A visit or activity note: either a bare string or `{ "text": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutlineNote {
    Text(String),
    Tagged { text: String },
}

impl OutlineNote {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Tagged { text: s } => s,
        }
    }
}

/// Render a structured outline into the plain-text payload the prompt
/// embeds. Overnight stops are numbered as days; zero-night stops are
/// labeled as pass-throughs.
pub fn flatten_outline(stops: &[OutlineStop]) -> String {
    let mut day = 0u32;
    let mut lines = Vec::with_capacity(stops.len());
    for (idx, stop) in stops.iter().enumerate() {
        let nights = stop.nights;
        let label = if nights > 0 {
            day += 1;
            format!("Day {day}")
        } else {
            "Pass-through".to_string()
        };
        let name = stop
            .name
            .clone()
            .unwrap_or_else(|| format!("Stop {}", idx + 1));
        let plural = if nights > 1 { "s" } else { "" };
        let mut line = format!("{label}: {name} ({nights} night{plural})");

        let visits: Vec<&str> = stop
            .visits
            .iter()
            .map(OutlineNote::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if !visits.is_empty() {
            line.push_str(&format!("\n  Visits: {}", visits.join(" | ")));
        }
        let activities: Vec<&str> = stop
            .activities
            .iter()
            .map(OutlineNote::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if !activities.is_empty() {
            line.push_str(&format!("\n  Activities: {}", activities.join(" | ")));
        }
        if let Some(desc) = stop.description.as_deref().filter(|d| !d.is_empty()) {
            line.push_str(&format!("\n  Info: {desc}"));
        }
        lines.push(line);
    }
    lines.join("\n")
}
