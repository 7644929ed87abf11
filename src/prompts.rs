//! Centralized prompt templates for the interviewer and analysis stages.
//!
//! Templates are keyed by stage and [`Locale`]. Their wording is not part of
//! the engine contract; only the markers they ask the model to emit are
//! (the choice block and the completion sentinel).

use serde::{Deserialize, Serialize};

use crate::storage::Stage;

/// Marker the interviewer appends when it considers the interview complete.
pub const COMPLETION_SENTINEL: &str = "[INTERVIEW_COMPLETE]";

/// Opening delimiter of the quick-reply block.
pub const CHOICES_OPEN: &str = "[CHOICES]";

/// Closing delimiter of the quick-reply block.
pub const CHOICES_CLOSE: &str = "[/CHOICES]";

/// Prompt and fallback language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ja,
    En,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Ja => "ja",
            Locale::En => "en",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ja" | "ja-jp" => Ok(Locale::Ja),
            "en" | "en-us" | "en-gb" => Ok(Locale::En),
            _ => Err(format!("Unknown locale: {}", s)),
        }
    }
}

/// Quick replies offered when the model did not supply any.
pub fn default_choices(locale: Locale) -> Vec<String> {
    let options: &[&str] = match locale {
        Locale::Ja => &["はい、そうです", "いいえ、違います", "もう少し詳しく説明します", "わかりません"],
        Locale::En => &["Yes, exactly", "No, not really", "Let me explain in more detail", "I'm not sure"],
    };
    options.iter().map(|s| s.to_string()).collect()
}

/// System prompt for the interviewer persona.
pub fn interviewer_prompt(theme: &str, locale: Locale) -> String {
    match locale {
        Locale::Ja => format!(
            r#"あなたは熟練したユーザーリサーチャーです。テーマ「{theme}」について、回答者の実体験を深掘りするデプスインタビューを行います。

ルール:
- 質問は一度に1つだけ。短く、具体的に。
- 「いつ」「どのくらいの頻度で」「その時どう対処したか」など事実を引き出す。
- 回答者の言葉を要約してから次の質問に進む。
- 各返答の最後に、回答者が選べる短い回答候補を3〜4個、次の形式で付ける:
{open}
候補1
候補2
{close}"#,
            theme = theme,
            open = CHOICES_OPEN,
            close = CHOICES_CLOSE
        ),
        Locale::En => format!(
            r#"You are an experienced user researcher running a depth interview about "{theme}". Uncover the respondent's concrete, lived experience.

Rules:
- Ask exactly one short, specific question at a time.
- Probe for facts: when it happens, how often, what they did about it.
- Briefly reflect the respondent's words before moving on.
- End every reply with 3-4 short suggested answers in this exact format:
{open}
option 1
option 2
{close}"#,
            theme = theme,
            open = CHOICES_OPEN,
            close = CHOICES_CLOSE
        ),
    }
}

/// Extra instruction once the interview should start wrapping up.
pub fn closing_instruction(locale: Locale) -> String {
    match locale {
        Locale::Ja => format!(
            "十分な情報が集まりつつあります。最後の確認となる締めくくりの質問をしてください。インタビューを終えてよいと判断したら、返答の末尾に {} を付けてください。",
            COMPLETION_SENTINEL
        ),
        Locale::En => format!(
            "You have gathered most of what you need. Ask a final wrap-up question. When the interview can end, append {} to your reply.",
            COMPLETION_SENTINEL
        ),
    }
}

/// Synthetic user message that asks the interviewer to open the conversation.
pub fn opening_request(locale: Locale) -> &'static str {
    match locale {
        Locale::Ja => "インタビューを始めてください。まず自己紹介と最初の質問をお願いします。",
        Locale::En => "Please begin the interview with a short introduction and your first question.",
    }
}

/// Instruction for one analysis stage.
pub fn stage_instruction(stage: Stage, locale: Locale) -> &'static str {
    match (stage, locale) {
        (Stage::Facts, Locale::Ja) => FACTS_JA,
        (Stage::Facts, Locale::En) => FACTS_EN,
        (Stage::Hypotheses, Locale::Ja) => HYPOTHESES_JA,
        (Stage::Hypotheses, Locale::En) => HYPOTHESES_EN,
        (Stage::Prd, Locale::Ja) => PRD_JA,
        (Stage::Prd, Locale::En) => PRD_EN,
        (Stage::Spec, Locale::Ja) => SPEC_JA,
        (Stage::Spec, Locale::En) => SPEC_EN,
        (Stage::Readiness, Locale::Ja) => READINESS_JA,
        (Stage::Readiness, Locale::En) => READINESS_EN,
        (Stage::CampaignAnalytics, Locale::Ja) => CAMPAIGN_JA,
        (Stage::CampaignAnalytics, Locale::En) => CAMPAIGN_EN,
    }
}

const FACTS_JA: &str = r#"以下のインタビュー記録から、解釈を加えずに事実だけを抽出してください。
JSONのみで回答してください:
{"facts": [{"id": "F1", "type": "fact|pain|frequency|workaround|need", "content": "事実", "evidence": "根拠となる発言", "severity": "high|medium|low"}]}
severity は type が pain の場合のみ付けてください。"#;

const FACTS_EN: &str = r#"Extract only observable facts from the interview transcript below. Do not interpret.
Respond with JSON only:
{"facts": [{"id": "F1", "type": "fact|pain|frequency|workaround|need", "content": "the fact", "evidence": "supporting quote", "severity": "high|medium|low"}]}
Include severity only for type pain."#;

const HYPOTHESES_JA: &str = r#"抽出された事実から、検証可能な課題仮説を3〜5個立ててください。
JSONのみで回答してください:
{"hypotheses": [{"id": "H1", "title": "仮説", "description": "説明", "supportingFacts": ["F1"], "counterEvidence": "反証となりうる点", "validationMethod": "検証方法"}]}"#;

const HYPOTHESES_EN: &str = r#"From the extracted facts, form 3-5 testable problem hypotheses.
Respond with JSON only:
{"hypotheses": [{"id": "H1", "title": "hypothesis", "description": "details", "supportingFacts": ["F1"], "counterEvidence": "what could disprove it", "validationMethod": "how to validate"}]}"#;

const PRD_JA: &str = r#"事実と仮説をもとにPRDを作成してください。
JSONのみで回答してください:
{"prd": {"name": "プロダクト名", "problemDefinition": "解決する課題", "targetUsers": "対象ユーザー", "jobsToBeDone": ["..."], "coreFeatures": [{"name": "機能", "description": "説明", "priority": "must|should|could", "acceptanceCriteria": ["..."]}], "nonGoals": ["..."], "userFlows": ["..."], "metrics": [{"name": "指標", "target": "目標値"}]}}"#;

const PRD_EN: &str = r#"Write a PRD grounded in the facts and hypotheses.
Respond with JSON only:
{"prd": {"name": "product name", "problemDefinition": "problem being solved", "targetUsers": "who", "jobsToBeDone": ["..."], "coreFeatures": [{"name": "feature", "description": "details", "priority": "must|should|could", "acceptanceCriteria": ["..."]}], "nonGoals": ["..."], "userFlows": ["..."], "metrics": [{"name": "metric", "target": "target value"}]}}"#;

const SPEC_JA: &str = r#"PRDを実装可能な仕様に落とし込んでください。
JSONのみで回答してください:
{"spec": {"projectName": "名前", "techStack": {"frontend": "...", "backend": "...", "database": "..."}, "dataModels": [{"name": "モデル", "fields": ["..."]}], "apiEndpoints": [{"method": "GET", "path": "/...", "description": "..."}], "screens": [{"name": "画面", "description": "..."}], "testCases": ["..."]}}"#;

const SPEC_EN: &str = r#"Turn the PRD into an implementable specification.
Respond with JSON only:
{"spec": {"projectName": "name", "techStack": {"frontend": "...", "backend": "...", "database": "..."}, "dataModels": [{"name": "model", "fields": ["..."]}], "apiEndpoints": [{"method": "GET", "path": "/...", "description": "..."}], "screens": [{"name": "screen", "description": "..."}], "testCases": ["..."]}}"#;

const READINESS_JA: &str = r#"PRDと仕様をもとに、リリース準備チェックリストを作成してください。
JSONのみで回答してください:
{"readiness": {"categories": [{"category": "カテゴリ", "items": [{"id": "R1", "description": "確認項目", "priority": "high|medium|low"}]}]}}"#;

const READINESS_EN: &str = r#"Produce a launch-readiness checklist from the PRD and spec.
Respond with JSON only:
{"readiness": {"categories": [{"category": "category", "items": [{"id": "R1", "description": "check item", "priority": "high|medium|low"}]}]}}"#;

const CAMPAIGN_JA: &str = r#"複数の回答者から集計した事実・課題・キーワードを分析し、回答者横断のパターンと示唆を導いてください。
JSONのみで回答してください:
{"analysis": {"summary": "全体要約", "patterns": [{"title": "パターン", "description": "説明", "respondentShare": "該当割合"}], "insights": ["..."], "recommendations": ["..."]}}"#;

const CAMPAIGN_EN: &str = r#"Analyze the facts, pain points and keywords aggregated across many respondents and derive cross-respondent patterns and implications.
Respond with JSON only:
{"analysis": {"summary": "overall summary", "patterns": [{"title": "pattern", "description": "details", "respondentShare": "share of respondents"}], "insights": ["..."], "recommendations": ["..."]}}"#;
