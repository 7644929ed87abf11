//! Typed stage payloads.
//!
//! Every stage has its own schema; [`StagePayload::Raw`] carries replies that
//! could not be read into one. On the wire each payload is a single-key object
//! (`{"facts": [...]}`, `{"prd": {...}}`, ...).

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::storage::Stage;

/// Kind of an extracted fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    #[default]
    Fact,
    Pain,
    Frequency,
    Workaround,
    Need,
    #[serde(other)]
    Other,
}

/// One observable fact taken from a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub fact_type: FactType,
    pub content: String,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub evidence: String,
    /// Only meaningful for pain facts.
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub severity: Option<String>,
}

impl Fact {
    pub fn new(id: impl Into<String>, fact_type: FactType, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fact_type,
            content: content.into(),
            evidence: String::new(),
            severity: None,
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }
}

/// Accept a string, number or boolean where a string is expected; null reads
/// as empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, found {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supporting_facts: Vec<String>,
    #[serde(default)]
    pub counter_evidence: String,
    #[serde(default)]
    pub validation_method: String,
}

/// Product requirements document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prd {
    pub name: String,
    #[serde(default)]
    pub problem_definition: String,
    #[serde(default)]
    pub target_users: String,
    #[serde(default)]
    pub jobs_to_be_done: Vec<String>,
    #[serde(default)]
    pub core_features: Vec<Feature>,
    #[serde(default)]
    pub non_goals: Vec<String>,
    #[serde(default)]
    pub user_flows: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub target: String,
}

/// Implementation specification derived from a PRD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecDocument {
    pub project_name: String,
    #[serde(default)]
    pub tech_stack: TechStack,
    #[serde(default)]
    pub data_models: Vec<DataModel>,
    #[serde(default)]
    pub api_endpoints: Vec<ApiEndpoint>,
    #[serde(default)]
    pub screens: Vec<Screen>,
    #[serde(default)]
    pub test_cases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    #[serde(default)]
    pub frontend: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub database: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModel {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screen {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Launch-readiness checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readiness {
    pub categories: Vec<ReadinessCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessCategory {
    pub category: String,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    #[serde(default)]
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub priority: String,
}

/// Cross-respondent synthesis for a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAnalysis {
    pub summary: String,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub respondent_share: String,
}

/// Output of one analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    Facts(Vec<Fact>),
    Hypotheses(Vec<Hypothesis>),
    Prd(Prd),
    Spec(SpecDocument),
    Readiness(Readiness),
    CampaignAnalytics(CampaignAnalysis),
    /// Reply kept verbatim because it did not fit the stage schema.
    Raw { stage: Stage, text: String },
}

/// Top-level key of a stage's wire object.
pub fn body_key(stage: Stage) -> &'static str {
    match stage {
        Stage::Facts => "facts",
        Stage::Hypotheses => "hypotheses",
        Stage::Prd => "prd",
        Stage::Spec => "spec",
        Stage::Readiness => "readiness",
        Stage::CampaignAnalytics => "analysis",
    }
}

impl StagePayload {
    pub fn stage(&self) -> Stage {
        match self {
            StagePayload::Facts(_) => Stage::Facts,
            StagePayload::Hypotheses(_) => Stage::Hypotheses,
            StagePayload::Prd(_) => Stage::Prd,
            StagePayload::Spec(_) => Stage::Spec,
            StagePayload::Readiness(_) => Stage::Readiness,
            StagePayload::CampaignAnalytics(_) => Stage::CampaignAnalytics,
            StagePayload::Raw { stage, .. } => *stage,
        }
    }

    /// Single-entry stand-in for a reply that could not be parsed.
    ///
    /// List-shaped stages get one synthetic item holding the text; document
    /// stages keep the text under `raw`.
    pub fn fallback(stage: Stage, text: &str) -> Self {
        let text = text.trim().to_string();
        match stage {
            Stage::Facts => StagePayload::Facts(vec![Fact::new("F1", FactType::Fact, text)]),
            Stage::Hypotheses => StagePayload::Hypotheses(vec![Hypothesis {
                id: "H1".to_string(),
                title: "Unstructured analysis".to_string(),
                description: text,
                supporting_facts: Vec::new(),
                counter_evidence: String::new(),
                validation_method: String::new(),
            }]),
            Stage::Readiness => StagePayload::Readiness(Readiness {
                categories: vec![ReadinessCategory {
                    category: "general".to_string(),
                    items: vec![ChecklistItem {
                        id: "R1".to_string(),
                        description: text,
                        priority: "medium".to_string(),
                    }],
                }],
            }),
            Stage::Prd | Stage::Spec | Stage::CampaignAnalytics => {
                StagePayload::Raw { stage, text }
            }
        }
    }

    /// Read a payload previously stored for `stage`.
    pub fn from_stored(stage: Stage, value: &serde_json::Value) -> Option<Self> {
        let inner = value.get(body_key(stage))?;

        if let Some(raw) = inner
            .as_object()
            .filter(|obj| obj.len() == 1)
            .and_then(|obj| obj.get("raw"))
            .and_then(|raw| raw.as_str())
        {
            return Some(StagePayload::Raw {
                stage,
                text: raw.to_string(),
            });
        }

        let inner = inner.clone();
        let payload = match stage {
            Stage::Facts => StagePayload::Facts(serde_json::from_value(inner).ok()?),
            Stage::Hypotheses => StagePayload::Hypotheses(serde_json::from_value(inner).ok()?),
            Stage::Prd => StagePayload::Prd(serde_json::from_value(inner).ok()?),
            Stage::Spec => StagePayload::Spec(serde_json::from_value(inner).ok()?),
            Stage::Readiness => StagePayload::Readiness(serde_json::from_value(inner).ok()?),
            Stage::CampaignAnalytics => {
                StagePayload::CampaignAnalytics(serde_json::from_value(inner).ok()?)
            }
        };
        Some(payload)
    }

    /// Facts carried by a facts payload; empty for anything else.
    pub fn into_facts(self) -> Vec<Fact> {
        match self {
            StagePayload::Facts(facts) => facts,
            _ => Vec::new(),
        }
    }
}

impl Serialize for StagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        let key = body_key(self.stage());
        match self {
            StagePayload::Facts(v) => map.serialize_entry(key, v)?,
            StagePayload::Hypotheses(v) => map.serialize_entry(key, v)?,
            StagePayload::Prd(v) => map.serialize_entry(key, v)?,
            StagePayload::Spec(v) => map.serialize_entry(key, v)?,
            StagePayload::Readiness(v) => map.serialize_entry(key, v)?,
            StagePayload::CampaignAnalytics(v) => map.serialize_entry(key, v)?,
            StagePayload::Raw { text, .. } => {
                map.serialize_entry(key, &serde_json::json!({ "raw": text }))?
            }
        }
        map.end()
    }
}
