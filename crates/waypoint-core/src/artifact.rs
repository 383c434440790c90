//! The structured artifact model: the tagged union every component
//! downstream of the response validator trusts.
//!
//! Field presence rules live here (`is_complete`); shape repair lives in
//! [`crate::validate`]. Serialized form matches the documents the cache
//! stores, so cache reads deserialize straight into these types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::ArtifactKind;

/// A validated, structured generation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredArtifact {
    Summary(SummaryArtifact),
    Itinerary(ItineraryArtifact),
}

impl StructuredArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Summary(_) => ArtifactKind::Summary,
            Self::Itinerary(_) => ArtifactKind::Itinerary,
        }
    }

    /// Structural completeness: whether this artifact counts as a usable
    /// result. Gates cache hits -- a partially-written entry is a miss.
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Summary(s) => !s.review.is_empty() && !s.steps.is_empty(),
            Self::Itinerary(i) => !i.days.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Review-and-steps summary of a trip outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryArtifact {
    /// Three review strings: strengths, weaknesses, verdict.
    pub review: Vec<String>,
    pub steps: Vec<StepCard>,
}

/// One overnight stop of a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCard {
    #[serde(default)]
    pub day: u32,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub highlights: String,
    /// Direction, distance and time to the next stop. Empty on the final
    /// step.
    #[serde(default)]
    pub next: String,
}

// ---------------------------------------------------------------------------
// Itinerary
// ---------------------------------------------------------------------------

/// A full extracted itinerary: header plus an ordered list of day plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryArtifact {
    #[serde(rename = "itin_id", default)]
    pub itinerary_id: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Total day count; derived from the day plans when the provider omits
    /// it.
    #[serde(default)]
    pub estimated_days_base: u32,
    /// Provider-shaped practical context (best months, vehicle type, ...),
    /// passed through opaquely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practical_context: Option<Value>,
    #[serde(rename = "ai_suggestions", default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Suggestions>,
    #[serde(rename = "days_plan", default)]
    pub days: Vec<DayPlan>,
}

/// Model-contributed suggestions beyond the source content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Suggestions {
    #[serde(default)]
    pub nearby_gems: Vec<String>,
    #[serde(default)]
    pub practical_tips: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// One day of an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    /// 1-based sequence position.
    #[serde(default)]
    pub day: u32,
    /// Section index within the day. Always 1 for generated plans.
    #[serde(default)]
    pub slice: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    /// Pacing weight: 0.5, 1.0 or 1.5 days of travel.
    #[serde(default)]
    pub suggested_days: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub night: Option<LodgingRef>,
    #[serde(default)]
    pub visits: Vec<VisitEntry>,
    #[serde(default)]
    pub activities: Vec<ActivityEntry>,
    /// Transition to the next day. `None` on the final day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_next_leg: Option<LegTransition>,
}

/// Where the night is spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodgingRef {
    pub place_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<[f64; 2]>,
}

/// A place to see. Providers sometimes return bare strings; both forms
/// deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VisitRepr")]
pub struct VisitEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_duration_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practical_info: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VisitRepr {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        place_id: Option<String>,
        #[serde(default)]
        coords: Option<[f64; 2]>,
        #[serde(default)]
        visit_duration_min: Option<u32>,
        #[serde(default)]
        practical_info: Option<Value>,
    },
}

impl From<VisitRepr> for VisitEntry {
    fn from(repr: VisitRepr) -> Self {
        match repr {
            VisitRepr::Text(text) => Self {
                text,
                place_id: None,
                coords: None,
                visit_duration_min: None,
                practical_info: None,
            },
            VisitRepr::Full {
                text,
                place_id,
                coords,
                visit_duration_min,
                practical_info,
            } => Self {
                text,
                place_id,
                coords,
                visit_duration_min,
                practical_info,
            },
        }
    }
}

/// Something to do. Same lenient parsing as [`VisitEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ActivityRepr")]
pub struct ActivityEntry {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_duration_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practical_info: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActivityRepr {
    Text(String),
    Full {
        text: String,
        #[serde(default)]
        place_id: Option<String>,
        #[serde(default)]
        coords: Option<[f64; 2]>,
        #[serde(default)]
        activity_duration_min: Option<u32>,
        #[serde(default)]
        practical_info: Option<Value>,
    },
}

impl From<ActivityRepr> for ActivityEntry {
    fn from(repr: ActivityRepr) -> Self {
        match repr {
            ActivityRepr::Text(text) => Self {
                text,
                place_id: None,
                coords: None,
                activity_duration_min: None,
                practical_info: None,
            },
            ActivityRepr::Full {
                text,
                place_id,
                coords,
                activity_duration_min,
                practical_info,
            } => Self {
                text,
                place_id,
                coords,
                activity_duration_min,
                practical_info,
            },
        }
    }
}

/// Descriptor of the drive to the next day's area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub road_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

// ---------------------------------------------------------------------------
// Place extraction
// ---------------------------------------------------------------------------

/// A distinct overnight place referenced by an itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub coords: [f64; 2],
    pub country: String,
    pub region_code: String,
}

/// Fold an itinerary into its distinct overnight places, first occurrence
/// wins. Place ids look like `CC::slug`.
pub fn extract_places(itinerary: &ItineraryArtifact) -> Vec<Place> {
    let mut seen = std::collections::HashSet::new();
    let mut places = Vec::new();

    for day in &itinerary.days {
        let Some(night) = &day.night else { continue };
        if night.place_id.is_empty() || !seen.insert(night.place_id.clone()) {
            continue;
        }
        let mut parts = night.place_id.split("::");
        let country = parts.next().unwrap_or("XX").to_string();
        let name = parts
            .next()
            .map(display_name_from_slug)
            .unwrap_or_else(|| "Unknown".to_string());
        places.push(Place {
            place_id: night.place_id.clone(),
            name,
            coords: night.coords.unwrap_or([0.0, 0.0]),
            region_code: day
                .region_code
                .clone()
                .unwrap_or_else(|| format!("{country}-00")),
            country,
        });
    }

    places
}

/// `painters_valley` -> `Painters Valley`.
fn display_name_from_slug(slug: &str) -> String {
    slug.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_with_night(day: u32, place_id: &str, coords: Option<[f64; 2]>) -> DayPlan {
        DayPlan {
            day,
            slice: 1,
            region_code: None,
            suggested_days: 1.0,
            night: Some(LodgingRef {
                place_id: place_id.to_string(),
                coords,
            }),
            visits: vec![],
            activities: vec![],
            to_next_leg: None,
        }
    }

    fn minimal_itinerary(days: Vec<DayPlan>) -> ItineraryArtifact {
        ItineraryArtifact {
            itinerary_id: "FR::23::creuse".into(),
            language: "en".into(),
            title: "Creuse".into(),
            subtitle: None,
            source_url: String::new(),
            created_at: None,
            estimated_days_base: days.len() as u32,
            practical_context: None,
            suggestions: None,
            days,
        }
    }

    #[test]
    fn summary_completeness_requires_both_arrays() {
        let complete = StructuredArtifact::Summary(SummaryArtifact {
            review: vec!["a".into(), "b".into(), "c".into()],
            steps: vec![StepCard {
                day: 1,
                city: "Gueret".into(),
                highlights: String::new(),
                next: String::new(),
            }],
        });
        assert!(complete.is_complete());

        let no_steps = StructuredArtifact::Summary(SummaryArtifact {
            review: vec!["a".into()],
            steps: vec![],
        });
        assert!(!no_steps.is_complete());
    }

    #[test]
    fn itinerary_completeness_requires_days() {
        let empty = StructuredArtifact::Itinerary(minimal_itinerary(vec![]));
        assert!(!empty.is_complete());

        let one_day =
            StructuredArtifact::Itinerary(minimal_itinerary(vec![day_with_night(1, "FR::x", None)]));
        assert!(one_day.is_complete());
    }

    #[test]
    fn untagged_roundtrip_discriminates_by_shape() {
        let summary = StructuredArtifact::Summary(SummaryArtifact {
            review: vec!["strengths".into()],
            steps: vec![],
        });
        let json = serde_json::to_value(&summary).unwrap();
        let back: StructuredArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ArtifactKind::Summary);

        let itinerary =
            StructuredArtifact::Itinerary(minimal_itinerary(vec![day_with_night(1, "FR::x", None)]));
        let json = serde_json::to_value(&itinerary).unwrap();
        let back: StructuredArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ArtifactKind::Itinerary);
    }

    #[test]
    fn visit_entries_accept_bare_strings() {
        let day: DayPlan = serde_json::from_value(serde_json::json!({
            "day": 1,
            "visits": ["a plain note", {"text": "a full note", "visit_duration_min": 30}],
        }))
        .unwrap();
        assert_eq!(day.visits[0].text, "a plain note");
        assert_eq!(day.visits[1].visit_duration_min, Some(30));
    }

    #[test]
    fn extract_places_deduplicates_first_wins() {
        let itin = minimal_itinerary(vec![
            day_with_night(1, "FR::fresselines", Some([46.38, 1.65])),
            day_with_night(2, "FR::fresselines", Some([0.0, 0.0])),
            day_with_night(3, "FR::painters_valley", None),
        ]);
        let places = extract_places(&itin);
        assert_eq!(places.len(), 2);
        assert_eq!(places[0].coords, [46.38, 1.65]);
        assert_eq!(places[1].name, "Painters Valley");
        assert_eq!(places[1].country, "FR");
        assert_eq!(places[1].region_code, "FR-00");
    }

    #[test]
    fn extract_places_skips_days_without_lodging() {
        let mut itin = minimal_itinerary(vec![day_with_night(1, "FR::x", None)]);
        itin.days.push(DayPlan {
            night: None,
            ..day_with_night(2, "unused", None)
        });
        assert_eq!(extract_places(&itin).len(), 1);
    }
}
