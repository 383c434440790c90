//! Parse and repair raw provider completions into structured artifacts.
//!
//! Providers are told to answer with bare JSON, but in practice wrap it in
//! code fences, omit derivable fields, or return prose. Everything
//! repairable is repaired here; only an unusable top-level shape is
//! rejected. This is the single place raw model text is trusted into the
//! typed artifact model.

use chrono::Utc;
use serde_json::Value;

use crate::artifact::{ItineraryArtifact, StructuredArtifact, SummaryArtifact};
use crate::error::MalformedResponse;
use crate::request::ArtifactKind;

/// Parse raw provider text into a validated artifact of the expected kind.
pub fn validate(raw: &str, kind: ArtifactKind) -> Result<StructuredArtifact, MalformedResponse> {
    let cleaned = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| MalformedResponse::NotJson(e.to_string()))?;

    match kind {
        ArtifactKind::Summary => validate_summary(value),
        ArtifactKind::Itinerary => validate_itinerary(value),
    }
}

/// Remove surrounding ```json / ``` fence markers, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn validate_summary(value: Value) -> Result<StructuredArtifact, MalformedResponse> {
    let obj = value
        .as_object()
        .ok_or(MalformedResponse::WrongShape("summary"))?;
    if !obj.get("review").is_some_and(Value::is_array) {
        return Err(MalformedResponse::MissingField("review"));
    }
    if !obj.get("steps").is_some_and(Value::is_array) {
        return Err(MalformedResponse::MissingField("steps"));
    }

    let mut summary: SummaryArtifact = serde_json::from_value(value)
        .map_err(|_| MalformedResponse::WrongShape("summary"))?;

    // The final step carries no onward transition.
    if let Some(last) = summary.steps.last_mut() {
        last.next.clear();
    }

    Ok(StructuredArtifact::Summary(summary))
}

fn validate_itinerary(value: Value) -> Result<StructuredArtifact, MalformedResponse> {
    // Accept either a bare itinerary object or an {"itins": [...]} envelope.
    let value = match value {
        Value::Object(mut obj) if obj.contains_key("itins") => {
            let itins = obj.remove("itins").unwrap_or(Value::Null);
            match itins {
                Value::Array(mut items) if !items.is_empty() => items.remove(0),
                _ => return Err(MalformedResponse::MissingField("itins")),
            }
        }
        other => other,
    };
    if !value.is_object() {
        return Err(MalformedResponse::WrongShape("itinerary"));
    }

    let mut itinerary: ItineraryArtifact = serde_json::from_value(value)
        .map_err(|_| MalformedResponse::WrongShape("itinerary"))?;

    if itinerary.days.is_empty() {
        return Err(MalformedResponse::MissingField("days_plan"));
    }

    repair_itinerary(&mut itinerary);
    Ok(StructuredArtifact::Itinerary(itinerary))
}

/// Synthesize the fields providers routinely omit but the orchestrator can
/// safely derive.
fn repair_itinerary(itinerary: &mut ItineraryArtifact) {
    if itinerary.itinerary_id.is_empty() {
        itinerary.itinerary_id = format!("XX::imported::{}", slugify(&itinerary.title));
    }
    if itinerary.created_at.is_none() {
        itinerary.created_at = Some(Utc::now().to_rfc3339());
    }

    let day_count = itinerary.days.len();
    for (idx, day) in itinerary.days.iter_mut().enumerate() {
        if day.day == 0 {
            day.day = idx as u32 + 1;
        }
        if day.slice == 0 {
            day.slice = 1;
        }
        if day.suggested_days <= 0.0 {
            day.suggested_days = 1.0;
        }
        // The final day carries no onward transition.
        if idx == day_count - 1 {
            day.to_next_leg = None;
        }
    }

    if itinerary.estimated_days_base == 0 {
        let total: f32 = itinerary.days.iter().map(|d| d.suggested_days).sum();
        itinerary.estimated_days_base = total.ceil() as u32;
    }
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let mut out = String::with_capacity(slug.len());
    let mut prev_dash = true;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                out.push(c);
            }
            prev_dash = true;
        } else {
            out.push(c);
            prev_dash = false;
        }
    }
    let trimmed = out.trim_end_matches('-');
    let capped = &trimmed[..trimmed.len().min(30)];
    if capped.is_empty() {
        "trip".to_string()
    } else {
        capped.to_string()
    }
}
