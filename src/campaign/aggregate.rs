//! Cross-respondent fact aggregation.
//!
//! Pure functions over already-loaded facts; nothing here touches storage.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::analysis::{Fact, FactType};

/// Inputs of the cross-analysis prompt are capped to these sizes.
pub const TOP_COMMON_FACTS: usize = 30;
pub const TOP_PAIN_POINTS: usize = 20;
pub const TOP_KEYWORDS: usize = 30;

/// Minimum keyword length in characters.
const MIN_KEYWORD_CHARS: usize = 2;

/// Separators besides whitespace and ASCII punctuation.
const EXTRA_SEPARATORS: &[char] = &[
    '、', '。', '，', '．', '！', '？', '：', '；', '・', '…', '「', '」', '『', '』', '（', '）',
    '［', '］', '【', '】', '〈', '〉', '《', '》', '“', '”', '‘', '’', '〜',
];

/// One deduplicated entry with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactCount {
    /// Normalized (trimmed, lower-cased) content.
    pub content: String,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// Read model over a campaign's completed sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignAggregate {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub common_facts: Vec<FactCount>,
    pub pain_points: Vec<FactCount>,
    pub frequency_analysis: Vec<FactCount>,
    pub keyword_counts: BTreeMap<String, u64>,
}

/// Reduce the facts of every completed session.
///
/// `completed` holds one fact list per completed session; a session without
/// a facts result contributes an empty list.
pub fn aggregate(total_sessions: u64, completed: &[Vec<Fact>]) -> CampaignAggregate {
    let facts: Vec<&Fact> = completed.iter().flatten().collect();

    let pains: Vec<&Fact> = facts
        .iter()
        .copied()
        .filter(|f| f.fact_type == FactType::Pain)
        .collect();
    let frequencies: Vec<&Fact> = facts
        .iter()
        .copied()
        .filter(|f| f.fact_type == FactType::Frequency)
        .collect();

    let mut keyword_counts = BTreeMap::new();
    for fact in &facts {
        for token in keywords(&fact.content) {
            *keyword_counts.entry(token).or_insert(0) += 1;
        }
    }

    CampaignAggregate {
        total_sessions,
        completed_sessions: completed.len() as u64,
        common_facts: group_count(&facts, false),
        pain_points: group_count(&pains, true),
        frequency_analysis: group_count(&frequencies, false),
        keyword_counts,
    }
}

/// Normalize content for equality: trimmed and lower-cased.
pub fn normalize(content: &str) -> String {
    content.trim().to_lowercase()
}

/// Group by normalized content, count, sort by count descending. Ties keep
/// first-seen order. With `keep_severity` the first severity seen is kept.
fn group_count(facts: &[&Fact], keep_severity: bool) -> Vec<FactCount> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<FactCount> = Vec::new();

    for fact in facts {
        let key = normalize(&fact.content);
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(&i) => {
                let entry = &mut counts[i];
                entry.count += 1;
                if keep_severity && entry.severity.is_none() {
                    entry.severity = fact.severity.clone();
                }
            }
            None => {
                index.insert(key.clone(), counts.len());
                counts.push(FactCount {
                    content: key,
                    count: 1,
                    severity: if keep_severity {
                        fact.severity.clone()
                    } else {
                        None
                    },
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || EXTRA_SEPARATORS.contains(&c)
}

/// Lower-cased tokens of at least two characters.
pub fn keywords(content: &str) -> Vec<String> {
    content
        .split(is_separator)
        .filter(|token| token.chars().count() >= MIN_KEYWORD_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Most frequent keywords, ties broken alphabetically.
pub fn top_keywords(counts: &BTreeMap<String, u64>, limit: usize) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

/// Capped view of an aggregate fed to the cross-analysis stage.
pub fn analysis_input(theme: &str, aggregate: &CampaignAggregate) -> serde_json::Value {
    let keywords: Vec<serde_json::Value> = top_keywords(&aggregate.keyword_counts, TOP_KEYWORDS)
        .into_iter()
        .map(|(keyword, count)| serde_json::json!({ "keyword": keyword, "count": count }))
        .collect();

    serde_json::json!({
        "theme": theme,
        "totalSessions": aggregate.total_sessions,
        "completedSessions": aggregate.completed_sessions,
        "commonFacts": aggregate.common_facts.iter().take(TOP_COMMON_FACTS).collect::<Vec<_>>(),
        "painPoints": aggregate.pain_points.iter().take(TOP_PAIN_POINTS).collect::<Vec<_>>(),
        "frequencyAnalysis": aggregate.frequency_analysis.iter().take(TOP_COMMON_FACTS).collect::<Vec<_>>(),
        "keywords": keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fact(fact_type: FactType, content: &str) -> Fact {
        Fact::new("", fact_type, content)
    }

    #[test]
    fn test_common_facts_are_case_and_trim_insensitive() {
        let sessions = vec![
            vec![fact(FactType::Fact, "Slow Login")],
            vec![fact(FactType::Fact, "slow login ")],
        ];
        let result = aggregate(2, &sessions);
        assert_eq!(
            result.common_facts,
            vec![FactCount {
                content: "slow login".to_string(),
                count: 2,
                severity: None
            }]
        );
    }

    #[test]
    fn test_pain_points_keep_first_severity() {
        let sessions = vec![
            vec![fact(FactType::Pain, "forgets password monthly").with_severity("high")],
            vec![fact(FactType::Pain, " Forgets password monthly").with_severity("low")],
            vec![fact(FactType::Workaround, "uses sticky notes")],
        ];
        let result = aggregate(3, &sessions);
        assert_eq!(result.pain_points.len(), 1);
        assert_eq!(result.pain_points[0].count, 2);
        assert_eq!(result.pain_points[0].severity.as_deref(), Some("high"));
        assert_eq!(result.common_facts[0].count, 2);
        assert_eq!(result.common_facts[1].content, "uses sticky notes");
        assert_eq!(result.common_facts[1].count, 1);
        assert!(result.common_facts[1].severity.is_none());
    }

    #[test]
    fn test_frequency_analysis_has_no_severity() {
        let sessions = vec![vec![
            fact(FactType::Frequency, "every morning").with_severity("high"),
            fact(FactType::Frequency, "Every morning"),
        ]];
        let result = aggregate(1, &sessions);
        assert_eq!(result.frequency_analysis[0].count, 2);
        assert!(result.frequency_analysis[0].severity.is_none());
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let sessions = vec![vec![
            fact(FactType::Fact, "b"),
            fact(FactType::Fact, "a"),
            fact(FactType::Fact, "c"),
            fact(FactType::Fact, "c"),
        ]];
        let contents: Vec<String> = aggregate(1, &sessions)
            .common_facts
            .into_iter()
            .map(|f| f.content)
            .collect();
        assert_eq!(contents, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            keywords("Forgets the PASSWORD, monthly! a"),
            vec!["forgets", "the", "password", "monthly"]
        );
        assert_eq!(keywords("パスワード、忘れる。"), vec!["パスワード", "忘れる"]);
    }

    #[test]
    fn test_keyword_counts_accumulate() {
        let sessions = vec![
            vec![fact(FactType::Pain, "password reset")],
            vec![fact(FactType::Fact, "Password manager")],
        ];
        let result = aggregate(2, &sessions);
        assert_eq!(result.keyword_counts.get("password"), Some(&2));
        assert_eq!(result.keyword_counts.get("reset"), Some(&1));
    }

    #[test]
    fn test_empty_campaign() {
        let result = aggregate(4, &[]);
        assert_eq!(result.total_sessions, 4);
        assert_eq!(result.completed_sessions, 0);
        assert!(result.common_facts.is_empty());
        assert!(result.keyword_counts.is_empty());
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(aggregate(0, &[])).unwrap();
        for key in [
            "totalSessions",
            "completedSessions",
            "commonFacts",
            "painPoints",
            "frequencyAnalysis",
            "keywordCounts",
        ] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_analysis_input_is_capped() {
        let many: Vec<Fact> = (0..40)
            .map(|i| fact(FactType::Pain, &format!("pain number {}", i)))
            .collect();
        let result = aggregate(1, &[many]);
        let input = analysis_input("auth", &result);
        assert_eq!(input["commonFacts"].as_array().unwrap().len(), TOP_COMMON_FACTS);
        assert_eq!(input["painPoints"].as_array().unwrap().len(), TOP_PAIN_POINTS);
        assert!(input["keywords"].as_array().unwrap().len() <= TOP_KEYWORDS);
    }

    #[test]
    fn test_top_keywords_ordering() {
        let mut counts = BTreeMap::new();
        counts.insert("beta".to_string(), 2);
        counts.insert("alpha".to_string(), 2);
        counts.insert("gamma".to_string(), 5);
        assert_eq!(
            top_keywords(&counts, 2),
            vec![("gamma".to_string(), 5), ("alpha".to_string(), 2)]
        );
    }
}
