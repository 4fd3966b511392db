//! # Review Generator
//!
//! Turns a lunch menu into a short review and two 1-5 scores.
//!
//! ## Response Format
//!
//! The model is asked to end its answer with two tagged lines:
//!
//! ```text
//! #NUTRI_RATE:4.5
//! #PREF_RATE:3.8
//! ```
//!
//! Every other non-blank line is review body. A score that is missing or unparsable stays
//! at [`DEFAULT_SCORE`]; a parsed one is clamped into [`MIN_SCORE`, `MAX_SCORE`].
//!
//! ## Fallbacks
//!
//! | Case | Text | Scores |
//! |---|---|---|
//! | no menu | [`NO_MENU_TEXT`] | 0.0 |
//! | empty body | [`NO_ANALYSIS_TEXT`] | 3.0 |
//! | endpoint fault | [`ERROR_TEXT`] | 3.0 |
use std::sync::Arc;

use tracing::error;

use crate::{
    models::NO_MENU,
    openai::{Completion, CompletionRequest},
};

pub const NO_MENU_TEXT: &str = "급식 정보가 없습니다.";
pub const NO_ANALYSIS_TEXT: &str = "메뉴 분석 결과를 생성하지 못했습니다.";
pub const ERROR_TEXT: &str = "메뉴 분석 중 오류가 발생했습니다.";

pub const DEFAULT_SCORE: f64 = 3.0;
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

const NUTRI_TAG: &str = "#NUTRI_RATE:";
const PREF_TAG: &str = "#PREF_RATE:";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;

const SYSTEM_PROMPT: &str = "당신은 학교 급식 메뉴를 평가하는 영양 전문가입니다.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Reviewed,
    NoMenu,
    NoAnalysis,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Draft {
    pub text: String,
    pub nutri_score: f64,
    pub pref_score: f64,
    pub outcome: Outcome,
}

impl Draft {
    fn fallback(text: &str, score: f64, outcome: Outcome) -> Self {
        Self {
            text: text.to_string(),
            nutri_score: score,
            pref_score: score,
            outcome,
        }
    }
}

pub struct ReviewGenerator {
    client: Arc<dyn Completion>,
}

impl ReviewGenerator {
    pub fn new(client: Arc<dyn Completion>) -> Self {
        Self { client }
    }

    /// Never fails: faults come back as a fallback [`Draft`] with [`Outcome::Failed`].
    pub async fn generate_review(&self, menu: &str) -> Draft {
        if menu.is_empty() || menu == NO_MENU {
            return Draft::fallback(NO_MENU_TEXT, 0.0, Outcome::NoMenu);
        }

        let prompt = build_prompt(menu);
        let request = CompletionRequest {
            system: SYSTEM_PROMPT,
            prompt: &prompt,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        match self.client.complete(&request).await {
            Ok(raw) => {
                #[cfg(feature = "verbose")]
                tracing::info!("Completion response: {raw}");

                parse_review(&raw)
            }
            Err(e) => {
                error!("Failed to generate review: {e}");
                Draft::fallback(ERROR_TEXT, DEFAULT_SCORE, Outcome::Failed)
            }
        }
    }
}

pub fn build_prompt(menu: &str) -> String {
    format!(
        "다음 학교 점심 메뉴를 영양 균형과 학생 선호도 두 관점에서 분석하고 평가하는 리뷰를 작성해 주세요.\n\
         \n\
         작성 조건:\n\
         - 리뷰는 450자 이내로 작성합니다.\n\
         - '이번 학교 급식은...'처럼 매번 같은 문장으로 시작하지 말고 시작 표현을 다양하게 바꿉니다. \
         도입 없이 바로 평가로 들어가도 좋습니다.\n\
         - 반드시 존댓말을 사용합니다.\n\
         \n\
         점심 메뉴: {menu}\n\
         \n\
         리뷰 끝에 줄을 바꾸고 5점 만점 점수를 아래 형식으로 정확히 두 줄 덧붙여 주세요.\n\
         {NUTRI_TAG}영양 평가 점수\n\
         {PREF_TAG}학생 선호도 점수"
    )
}

pub fn parse_review(raw: &str) -> Draft {
    let text = raw.trim().replace("\n\n", "\n");

    let mut nutri_score = DEFAULT_SCORE;
    let mut pref_score = DEFAULT_SCORE;
    let mut body = Vec::new();

    for line in text.lines() {
        if let Some(value) = line.strip_prefix(NUTRI_TAG) {
            if let Some(score) = parse_score(value) {
                nutri_score = score;
            }
        } else if let Some(value) = line.strip_prefix(PREF_TAG) {
            if let Some(score) = parse_score(value) {
                pref_score = score;
            }
        } else if !line.trim().is_empty() {
            body.push(line.trim());
        }
    }

    if body.is_empty() {
        return Draft::fallback(NO_ANALYSIS_TEXT, DEFAULT_SCORE, Outcome::NoAnalysis);
    }

    Draft {
        text: body.join("\n"),
        nutri_score,
        pref_score,
        outcome: Outcome::Reviewed,
    }
}

fn parse_score(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|score| !score.is_nan())
        .map(|score| score.clamp(MIN_SCORE, MAX_SCORE))
}
