use lazy_static::lazy_static;

use shared::{Disease, Severity, TreatmentPlan, id_denotes_healthy};

use crate::vision::GeminiClient;

/// One keyword bucket of the severity policy. Rules are evaluated in
/// order; the first bucket containing a matched keyword wins.
pub struct SeverityRule {
    pub keywords: &'static [&'static str],
    pub severity: Severity,
    pub impact: i32,
}

/// Severity policy for ids the registry does not know. "healthy" comes
/// first so it overrides everything else; the default for an id matching
/// no bucket is medium with a mild impact.
pub const SEVERITY_RULES: &[SeverityRule] = &[
    SeverityRule {
        keywords: &["healthy"],
        severity: Severity::Low,
        impact: 0,
    },
    SeverityRule {
        keywords: &["blight", "rot", "wilt", "virus", "esca", "scab", "haunglongbing"],
        severity: Severity::High,
        impact: 60,
    },
    SeverityRule {
        keywords: &["spot", "rust", "mildew", "scorch", "mold"],
        severity: Severity::Medium,
        impact: 35,
    },
];

const DEFAULT_SEVERITY: Severity = Severity::Medium;
const DEFAULT_IMPACT: i32 = 30;

pub fn severity_for_id(disease_id: &str) -> (Severity, i32) {
    let lowered = disease_id.to_ascii_lowercase();
    for rule in SEVERITY_RULES {
        if rule.keywords.iter().any(|k| lowered.contains(k)) {
            return (rule.severity, rule.impact);
        }
    }
    (DEFAULT_SEVERITY, DEFAULT_IMPACT)
}

/// `tomato-early-blight` -> `Tomato Early Blight`. Empty or
/// separator-only ids get a generic display name.
pub fn format_disease_name(disease_id: &str) -> String {
    let words: Vec<String> = disease_id
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        "Unknown Condition".to_string()
    } else {
        words.join(" ")
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Last-resort treatment text used when no registry entry exists and the
/// generative model produced nothing usable.
pub fn generic_treatment(healthy: bool) -> TreatmentPlan {
    if healthy {
        TreatmentPlan {
            immediate: strings(&[
                "No treatment needed - your plant looks great!",
                "Continue current care routine",
            ]),
            organic: strings(&[
                "Compost tea foliar spray monthly for micronutrient boost",
                "Mulch 2-3 inches around base for moisture retention",
            ]),
            chemical: strings(&["No chemical treatment required"]),
            prevention: strings(&[
                "Regular monitoring - catch problems early",
                "Maintain consistent watering schedule",
                "Keep tools clean to prevent pathogen spread",
            ]),
            recovery_timeline: "No recovery needed. Maintain current practices for continued plant health.".to_string(),
        }
    } else {
        TreatmentPlan {
            immediate: strings(&[
                "Remove visibly affected leaves and dispose of them away from the garden",
                "Isolate the plant from healthy neighbors where possible",
            ]),
            organic: strings(&[
                "Apply neem oil or a copper-based spray every 7 days",
                "Improve air circulation around the plant",
            ]),
            chemical: strings(&[
                "Apply a broad-spectrum fungicide following label directions",
            ]),
            prevention: strings(&[
                "Water at soil level and avoid wetting the foliage",
                "Rotate crops and clear plant debris each season",
                "Monitor new growth closely for recurring symptoms",
            ]),
            recovery_timeline: "2-4 weeks with consistent treatment, depending on severity.".to_string(),
        }
    }
}

lazy_static! {
    /// Static disease registry. Ids are unique; absence of an id is an
    /// expected state that triggers synthesis, not an error.
    pub static ref DISEASE_REGISTRY: Vec<Disease> = vec![
        Disease {
            id: "tomato-early-blight".to_string(),
            name: "Tomato Early Blight".to_string(),
            scientific_name: Some("Alternaria solani".to_string()),
            pathogen_type: Some("Fungal pathogen (Ascomycete)".to_string()),
            spread_mechanism: Some(
                "Wind-borne spores, rain splash, contaminated soil debris. Survives in plant residue over winter."
                    .to_string(),
            ),
            crop_family: "tomato".to_string(),
            recommendations: strings(&[
                "Remove infected leaves immediately",
                "Apply copper-based fungicide spray",
                "Increase airflow around plants",
                "Water at soil level, avoid wetting leaves",
                "Mulch to prevent soil splash",
            ]),
            severity: Severity::Medium,
            treatment: TreatmentPlan {
                immediate: strings(&[
                    "Remove all affected leaves and stems - bag and dispose, do not compost",
                    "Isolate infected plants from healthy ones if possible",
                    "Reduce overhead watering immediately",
                ]),
                organic: strings(&[
                    "Neem oil spray (2 tbsp per gallon water) every 7 days",
                    "Copper fungicide (Bordeaux mixture) application",
                    "Baking soda spray (1 tbsp per gallon + liquid soap)",
                ]),
                chemical: strings(&[
                    "Chlorothalonil-based fungicide (e.g., Daconil)",
                    "Mancozeb 75% WP - apply at 2g/L every 10 days",
                    "Azoxystrobin (Quadris) for systemic protection",
                ]),
                prevention: strings(&[
                    "Rotate crops - avoid planting tomatoes in same spot for 3 years",
                    "Plant resistant varieties (e.g., Mountain Magic, Defiant)",
                    "Mulch heavily to prevent soil splash onto lower leaves",
                    "Ensure 24\" spacing between plants for air circulation",
                ]),
                recovery_timeline:
                    "2-4 weeks with proper treatment. New growth should appear healthy within 10 days of fungicide application."
                        .to_string(),
            },
            beginner_description:
                "Your tomato plant has dark spots on its lower leaves that spread outward in rings. This is a common fungal issue that can be treated with simple sprays."
                    .to_string(),
            advanced_description:
                "Alternaria solani infection detected. Characteristic concentric ring lesions (target spots) on older foliage indicate early blight. Optimal conditions: 75-85F with alternating wet/dry periods."
                    .to_string(),
            common_regions: strings(&["Southeast US", "Midwest US", "Mediterranean", "South Asia", "East Africa"]),
            seasonal_risk: strings(&["Late Spring", "Summer", "Early Fall"]),
            health_score_impact: 35,
        },
        Disease {
            id: "tomato-late-blight".to_string(),
            name: "Tomato Late Blight".to_string(),
            scientific_name: Some("Phytophthora infestans".to_string()),
            pathogen_type: Some("Oomycete (water mold)".to_string()),
            spread_mechanism: Some(
                "Airborne sporangia can travel 30+ miles. Thrives in cool, wet conditions.".to_string(),
            ),
            crop_family: "tomato".to_string(),
            recommendations: strings(&[
                "Remove and destroy infected plants",
                "Apply fungicide immediately",
                "Improve air circulation",
                "Avoid overhead watering",
                "Plant resistant varieties next season",
            ]),
            severity: Severity::High,
            treatment: TreatmentPlan {
                immediate: strings(&[
                    "URGENT: Remove and destroy all infected plant material immediately",
                    "Do NOT compost infected tissue - burn or bag for landfill",
                    "Apply fungicide to remaining healthy plants within 24 hours",
                ]),
                organic: strings(&[
                    "Copper hydroxide spray - apply immediately and repeat every 5-7 days",
                    "Bacillus subtilis (Serenade) biological fungicide",
                    "Remove lower 12\" of foliage to reduce humidity around stems",
                ]),
                chemical: strings(&[
                    "Mefenoxam/Metalaxyl (Ridomil Gold) - systemic protection",
                    "Chlorothalonil as a protectant on unaffected foliage",
                ]),
                prevention: strings(&[
                    "Plant certified disease-free transplants",
                    "Avoid overhead irrigation late in the day",
                    "Destroy volunteer tomatoes and potatoes nearby",
                ]),
                recovery_timeline:
                    "Severe infections are usually fatal to the plant. Protect unaffected plants; new plantings can follow after sanitation."
                        .to_string(),
            },
            beginner_description:
                "Water-soaked gray-green patches that brown rapidly are late blight, the most destructive tomato disease. Act fast - it spreads to neighboring plants within days."
                    .to_string(),
            advanced_description:
                "Phytophthora infestans infection. Pale-green water-soaked lesions at leaf margins expanding to brown-black necrosis with white sporulation on abaxial surfaces under humidity."
                    .to_string(),
            common_regions: strings(&["Northeast US", "Pacific Northwest", "Northern Europe", "Highland Tropics"]),
            seasonal_risk: strings(&["Late Summer", "Fall"]),
            health_score_impact: 45,
        },
        Disease {
            id: "apple-scab".to_string(),
            name: "Apple Scab".to_string(),
            scientific_name: Some("Venturia inaequalis".to_string()),
            pathogen_type: Some("Fungal pathogen (Ascomycete)".to_string()),
            spread_mechanism: Some(
                "Ascospores released from overwintered leaf litter during spring rains.".to_string(),
            ),
            crop_family: "apple".to_string(),
            recommendations: strings(&[
                "Rake and destroy fallen leaves in autumn",
                "Apply fungicide at bud break",
                "Prune for an open canopy",
                "Plant scab-resistant cultivars",
            ]),
            severity: Severity::Medium,
            treatment: TreatmentPlan {
                immediate: strings(&[
                    "Remove heavily infected leaves and fruit",
                    "Start a protectant spray program on clean growth",
                ]),
                organic: strings(&[
                    "Sulfur or lime-sulfur sprays at 7-10 day intervals",
                    "Autumn leaf cleanup to break the infection cycle",
                ]),
                chemical: strings(&[
                    "Captan or myclobutanil per label timing",
                    "Use Mills Table infection periods to time sprays precisely",
                ]),
                prevention: strings(&[
                    "Plant scab-resistant cultivars (e.g., Liberty, Enterprise, GoldRush)",
                    "Prune for open center canopy to speed leaf drying",
                    "Maintain spray coverage on new growth through June",
                ]),
                recovery_timeline:
                    "Existing scab lesions are permanent but sporulation can be stopped. Clean new growth within 7-14 days of effective treatment."
                        .to_string(),
            },
            beginner_description:
                "Dark, scaly patches on leaves and fruit are apple scab. Clean up fallen leaves in autumn and spray at bud break - that alone makes a big difference."
                    .to_string(),
            advanced_description:
                "Venturia inaequalis ascospore-driven primary infection. Olive-green velvety lesions on adaxial leaf surface with conidiophore production indicate active sporulation."
                    .to_string(),
            common_regions: strings(&["Northeast US", "Pacific Northwest", "Northern Europe", "UK", "New Zealand"]),
            seasonal_risk: strings(&["Spring", "Early Summer"]),
            health_score_impact: 30,
        },
        Disease {
            id: "healthy".to_string(),
            name: "Healthy Plant".to_string(),
            scientific_name: None,
            pathogen_type: None,
            spread_mechanism: None,
            crop_family: "auto".to_string(),
            recommendations: strings(&[
                "Continue regular watering schedule",
                "Maintain proper fertilization",
                "Monitor for early signs of stress",
                "Ensure good air circulation",
                "Keep area free of plant debris",
            ]),
            severity: Severity::Low,
            treatment: generic_treatment(true),
            beginner_description:
                "Great news! Your plant looks healthy with no signs of disease. Keep doing what you're doing!"
                    .to_string(),
            advanced_description:
                "No pathogenic signatures detected. Leaf coloration, turgor, and morphology within normal parameters. No evidence of biotic or abiotic stress markers."
                    .to_string(),
            common_regions: Vec::new(),
            seasonal_risk: Vec::new(),
            health_score_impact: 0,
        },
    ];
}

pub fn lookup(disease_id: &str) -> Option<&'static Disease> {
    DISEASE_REGISTRY.iter().find(|d| d.id == disease_id)
}

/// The fixed "Healthy Plant" object. `unknown` resolves here because a
/// low-confidence or ambiguous prediction defaults to the optimistic
/// assumption.
pub fn healthy_fallback() -> Disease {
    lookup("healthy")
        .cloned()
        .unwrap_or_else(|| synthesize_record("healthy"))
}

fn synthesize_record(disease_id: &str) -> Disease {
    let name = format_disease_name(disease_id);
    let (severity, impact) = severity_for_id(disease_id);
    let healthy = id_denotes_healthy(disease_id);

    Disease {
        id: disease_id.to_string(),
        name: name.clone(),
        scientific_name: None,
        pathogen_type: None,
        spread_mechanism: None,
        crop_family: "auto".to_string(),
        recommendations: if healthy {
            strings(&[
                "Continue regular watering schedule",
                "Monitor for early signs of stress",
            ])
        } else {
            strings(&[
                "Remove affected foliage promptly",
                "Treat with an appropriate fungicide or bactericide",
                "Consult a local agricultural extension for confirmation",
            ])
        },
        severity,
        treatment: generic_treatment(healthy),
        beginner_description: if healthy {
            format!("{name} detected - the leaf shows no concerning disease signs.")
        } else {
            format!(
                "We detected signs of {name}. Early treatment gives the best chance of a full recovery."
            )
        },
        advanced_description: format!(
            "Class '{disease_id}' is not present in the static disease registry; profile synthesized from the classifier output and severity keyword policy."
        ),
        common_regions: Vec::new(),
        seasonal_risk: Vec::new(),
        health_score_impact: impact,
    }
}

/// Maps a canonical disease id to a fully-populated disease shape. Total:
/// registry hit, the `unknown` sentinel, and arbitrary unmapped ids all
/// produce complete objects. For synthesized non-healthy entries a real
/// treatment plan is requested from the generative model, with the generic
/// plan as the floor.
pub async fn resolve(
    disease_id: &str,
    confidence: f32,
    vision: Option<&GeminiClient>,
) -> Disease {
    if let Some(known) = lookup(disease_id) {
        return known.clone();
    }

    if disease_id == "unknown" {
        return healthy_fallback();
    }

    let mut record = synthesize_record(disease_id);
    if !record.denotes_healthy() {
        if let Some(client) = vision {
            if let Some(plan) = client.generate_treatment(&record.name, confidence).await {
                record.treatment = plan;
            }
        }
    }
    record
}
