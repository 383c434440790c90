//! Prompt construction: an instruction block per artifact kind and target
//! language, joined with the request payload.
//!
//! Kept behind one function so the orchestrator treats it as an opaque
//! mapping from (kind, language) to instruction text.

use crate::request::ArtifactKind;

/// Languages with a localized summary instruction; everything else falls
/// back to English.
const LANG_NAMES: &[(&str, &str)] = &[
    ("fr", "French"),
    ("en", "English"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ar", "Arabic"),
    ("de", "German"),
];

fn language_name(code: &str) -> &'static str {
    LANG_NAMES
        .iter()
        .find(|(c, _)| code.eq_ignore_ascii_case(c))
        .map(|(_, name)| *name)
        .unwrap_or("English")
}

/// Build the full prompt for one generation request.
pub fn build_prompt(kind: ArtifactKind, language: &str, payload: &str) -> String {
    match kind {
        ArtifactKind::Summary => format!(
            "{}\n\nItinerary:\n{payload}",
            summary_instructions(language)
        ),
        ArtifactKind::Itinerary => format!("{}\n\nSOURCE:\n{payload}", itinerary_instructions(language)),
    }
}

fn summary_instructions(language: &str) -> String {
    let body = match language {
        "fr" => {
            "Tu es un expert en road trips. Réponds UNIQUEMENT en JSON valide (pas de texte \
             avant/après, pas de backticks).\n\
             Format: {\"review\":[\"Points forts: ...\",\"Points faibles: ...\",\"Avis: pour qui, \
             réduire/augmenter, conseil\"],\"steps\":[{\"day\":1,\"city\":\"NOM\",\"highlights\":\
             \"1-2 phrases, noms clés EN MAJUSCULES\",\"next\":\"direction + distance + temps\"}]}\n\
             Règles: review=3 chaînes, steps=étapes avec nuits>0, passages intégrés dans le next \
             précédent, next=\"\" pour la dernière étape. Concis, enthousiaste."
        }
        "es" => {
            "Experto en road trips. Responde SOLO con JSON válido (sin texto antes/después, sin \
             backticks).\n\
             Formato: {\"review\":[\"Fuertes: ...\",\"Débiles: ...\",\"Veredicto: ...\"],\"steps\":\
             [{\"day\":1,\"city\":\"CIUDAD\",\"highlights\":\"1-2 frases, nombres EN MAYÚSCULAS\",\
             \"next\":\"dirección + distancia + tiempo\"}]}\n\
             review=3, steps=etapas con noches>0, next=\"\" en la última. Conciso, entusiasta."
        }
        "it" => {
            "Esperto di road trip. Rispondi SOLO con JSON valido (nessun testo prima/dopo, nessun \
             backtick).\n\
             Formato: {\"review\":[\"Forza: ...\",\"Deboli: ...\",\"Giudizio: ...\"],\"steps\":\
             [{\"day\":1,\"city\":\"CITTÀ\",\"highlights\":\"1-2 frasi, nomi IN MAIUSCOLO\",\
             \"next\":\"direzione + distanza + tempo\"}]}\n\
             review=3, steps=tappe con notti>0, next=\"\" sull'ultima. Conciso, entusiasta."
        }
        "pt" => {
            "Especialista em road trips. Responda APENAS com JSON válido (sem texto antes/depois, \
             sem backticks).\n\
             Formato: {\"review\":[\"Fortes: ...\",\"Fracos: ...\",\"Veredicto: ...\"],\"steps\":\
             [{\"day\":1,\"city\":\"CIDADE\",\"highlights\":\"1-2 frases, nomes EM MAIÚSCULAS\",\
             \"next\":\"direção + distância + tempo\"}]}\n\
             review=3, steps=etapas com noites>0, next=\"\" na última. Conciso, entusiasta."
        }
        _ => {
            "You are a road trip expert. Respond ONLY with valid JSON (no text before/after, no \
             backticks).\n\
             Format: {\"review\":[\"Strengths: ...\",\"Weaknesses: ...\",\"Verdict: who, \
             shorten/extend, tip\"],\"steps\":[{\"day\":1,\"city\":\"NAME\",\"highlights\":\"1-2 \
             sentences, key names IN CAPITALS\",\"next\":\"direction + distance + time\"}]}\n\
             Rules: review=3 strings, steps=stops with nights>0, pass-throughs folded into the \
             previous next, next=\"\" on the last step. Concise, enthusiastic."
        }
    };
    body.to_string()
}

fn itinerary_instructions(language: &str) -> String {
    let lang_name = language_name(language);
    let lang_code = if language.is_empty() { "en" } else { language };
    format!(
        "You are a structured data extractor. Output ONLY valid JSON, no text, no Markdown.\n\
         \n\
         SOURCE FIDELITY: extract ONLY places and activities explicitly mentioned in the source. \
         Keep the SAME number of days and stops. Do NOT invent stops. You SHOULD enrich \
         descriptions with verifiable facts (dates, dimensions, historical details).\n\
         \n\
         Transform the SOURCE into JSON with a single \"itins\" array holding one object:\n\
         {{\"itins\":[{{\"itin_id\":\"CC::region::slug\",\"language\":\"{lang_code}\",\
         \"title\":\"...\",\"subtitle\":\"one sober tagline\",\"estimated_days_base\":2,\
         \"practical_context\":{{\"best_months\":[],\"vehicle_type\":\"\",\"group_type\":\"\",\
         \"loop_type\":\"\",\"total_km\":0,\"daily_average_km\":0,\"highlights\":[]}},\
         \"ai_suggestions\":{{\"nearby_gems\":[],\"practical_tips\":[],\"warnings\":[]}},\
         \"days_plan\":[{{\"day\":1,\"slice\":1,\"region_code\":\"CC-00\",\"suggested_days\":1.0,\
         \"night\":{{\"place_id\":\"CC::slug\",\"coords\":[0.0,0.0]}},\"visits\":[{{\"text\":\"...\",\
         \"place_id\":\"CC::slug\",\"coords\":[0.0,0.0],\"visit_duration_min\":60}}],\
         \"activities\":[],\"to_next_leg\":{{\"distance_km\":0,\"drive_min\":0,\
         \"transport_mode\":\"car\",\"road_type\":\"Tarmac\",\"method\":\"heuristic\"}}}}]}}]}}\n\
         \n\
         Rules:\n\
         1. visits[] = places (monuments, museums, sites, viewpoints); activities[] = actions \
         (hikes, kayaking, cycling, walks).\n\
         2. suggested_days: 0.5 | 1.0 | 1.5 -- beyond 1.5, split into multiple days.\n\
         3. estimated_days_base = CEIL(sum of suggested_days).\n\
         4. to_next_leg on all days EXCEPT the last.\n\
         5. coords = [lat, lon], from your own knowledge.\n\
         6. itin_id = CC::region::slug (CC = ISO2 country code); slice = always 1.\n\
         7. ai_suggestions = 2-4 nearby gems, 2-4 practical tips, 0-2 warnings -- written in \
         {lang_name}.\n\
         8. Factual style only: every sentence carries verifiable information (a date, a \
         dimension, a proper name, a historical fact). No lyrical filler, no empty superlatives.\n\
         9. Keep museums, monuments, parks and public sites; drop named businesses, people's \
         names and exact prices.\n\
         \n\
         OUTPUT LANGUAGE: every text field MUST be written in {lang_name}; set \
         \"language\":\"{lang_code}\". Keep original proper nouns."
    )
}
