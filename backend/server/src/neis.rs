//! # NEIS
//!
//! Public school data service. Two endpoints are used:
//!
//! - `schoolInfo`: schools of one kind under one education office
//! - `mealServiceDietInfo`: a school's meals for one day
//!
//! Both answer `{"<service>": [{"head": [...]}, {"row": [...]}]}` on success and
//! `{"RESULT": {"CODE": ..., "MESSAGE": ...}}` when there is nothing to return.
//!
//! ## Menu Text
//!
//! `DDISH_NM` packs the dishes into one field separated by `<br/>`, each dish carrying
//! its allergy codes in parentheses, e.g. `김치볶음밥(5.9.13)<br/>된장국(5.6)`.
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{error, warn};

use crate::{config::Config, error::UpstreamError, models::School, utils::storage_key};

const SCHOOL_PAGE_SIZE: &str = "1000";
const MEAL_PAGE_SIZE: &str = "100";
const LUNCH_CODE: &str = "2";
/// `INFO-200`: no data for the query, not a fault.
const NO_DATA_CODE: &str = "INFO-200";

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"));

#[async_trait]
pub trait MealSource: Send + Sync {
    async fn schools(&self) -> Result<Vec<School>, UpstreamError>;

    /// Normalized lunch menu, `None` when the upstream has no entry.
    async fn menu(&self, school_code: &str, date: NaiveDate)
    -> Result<Option<String>, UpstreamError>;
}

#[derive(Deserialize)]
struct Section<T> {
    #[serde(default = "Vec::new")]
    row: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct ApiResult {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct SchoolInfo {
    #[serde(rename = "schoolInfo")]
    school_info: Option<Vec<Section<SchoolRow>>>,
    #[serde(rename = "RESULT")]
    result: Option<ApiResult>,
}

#[derive(Deserialize)]
struct SchoolRow {
    #[serde(rename = "SD_SCHUL_CODE")]
    code: String,
    #[serde(rename = "SCHUL_NM")]
    name: String,
}

#[derive(Deserialize)]
struct MealInfo {
    #[serde(rename = "mealServiceDietInfo")]
    meal_info: Option<Vec<Section<MealRow>>>,
    #[serde(rename = "RESULT")]
    result: Option<ApiResult>,
}

#[derive(Deserialize)]
struct MealRow {
    #[serde(rename = "MMEAL_SC_CODE", default)]
    meal_code: String,
    #[serde(rename = "DDISH_NM")]
    dishes: String,
}

pub struct NeisClient {
    http: Client,
    base_url: String,
    api_key: String,
    office_code: String,
    school_kind: String,
}

impl NeisClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: Client::new(),
            base_url: config.neis_url.trim_end_matches('/').to_string(),
            api_key: config.neis_key.clone(),
            office_code: config.office_code.clone(),
            school_kind: config.school_kind.clone(),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        service: &str,
        params: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/{service}", self.base_url))
            .query(&[
                ("KEY", self.api_key.as_str()),
                ("Type", "json"),
                ("pIndex", "1"),
                ("ATPT_OFCDC_SC_CODE", self.office_code.as_str()),
            ])
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MealSource for NeisClient {
    async fn schools(&self) -> Result<Vec<School>, UpstreamError> {
        let info: SchoolInfo = self
            .get(
                "schoolInfo",
                &[
                    ("pSize", SCHOOL_PAGE_SIZE),
                    ("SCHUL_KND_SC_NM", self.school_kind.as_str()),
                ],
            )
            .await?;

        let Some(sections) = info.school_info else {
            check_result(info.result)?;
            return Ok(Vec::new());
        };

        let schools = sections
            .into_iter()
            .flat_map(|section| section.row)
            .map(|row| School {
                code: row.code,
                name: row.name,
            })
            .collect();

        Ok(schools)
    }

    async fn menu(
        &self,
        school_code: &str,
        date: NaiveDate,
    ) -> Result<Option<String>, UpstreamError> {
        let day = storage_key(date);
        let info: MealInfo = self
            .get(
                "mealServiceDietInfo",
                &[
                    ("pSize", MEAL_PAGE_SIZE),
                    ("SD_SCHUL_CODE", school_code),
                    ("MLSV_YMD", day.as_str()),
                ],
            )
            .await?;

        let Some(sections) = info.meal_info else {
            check_result(info.result)?;
            return Ok(None);
        };

        let rows: Vec<MealRow> = sections
            .into_iter()
            .flat_map(|section| section.row)
            .collect();

        let row = rows
            .iter()
            .find(|row| row.meal_code == LUNCH_CODE)
            .or_else(|| rows.first());

        Ok(row.and_then(|row| normalize_menu(&row.dishes)))
    }
}

fn check_result(result: Option<ApiResult>) -> Result<(), UpstreamError> {
    match result {
        Some(result) if result.code != NO_DATA_CODE => Err(UpstreamError::Api {
            code: result.code,
            message: result.message,
        }),
        _ => Ok(()),
    }
}

/// Splits on line breaks, drops each dish's parenthesized allergy suffix and joins with `", "`.
pub fn normalize_menu(raw: &str) -> Option<String> {
    let dishes: Vec<&str> = LINE_BREAK
        .split(raw)
        .map(|dish| dish.split('(').next().unwrap_or_default().trim())
        .filter(|dish| !dish.is_empty())
        .collect();

    if dishes.is_empty() {
        return None;
    }

    Some(dishes.join(", "))
}

/// Schools sorted by name; empty on any fault.
pub async fn list_schools(source: &dyn MealSource) -> Vec<School> {
    let mut schools = source.schools().await.unwrap_or_else(|e| {
        error!("Failed to fetch schools: {e}");
        Vec::new()
    });
    schools.sort_by(|a, b| a.name.cmp(&b.name));

    schools
}

/// Normalized menu, `None` on a miss or any fault.
pub async fn fetch_menu(
    source: &dyn MealSource,
    school_code: &str,
    date: NaiveDate,
) -> Option<String> {
    source.menu(school_code, date).await.unwrap_or_else(|e| {
        warn!("Failed to fetch menu for {school_code}: {e}");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meals::tests::ScriptedSource;

    #[test]
    fn test_normalize_menu() {
        assert_eq!(
            normalize_menu("김치볶음밥(5.9.13)<br/>된장국(5.6)").as_deref(),
            Some("김치볶음밥, 된장국")
        );
    }

    #[test]
    fn test_normalize_menu_spacing() {
        assert_eq!(
            normalize_menu("  잡곡밥 <br/> 닭갈비 (1.5.6) <br />우유").as_deref(),
            Some("잡곡밥, 닭갈비, 우유")
        );
        assert_eq!(normalize_menu("사과<BR>배").as_deref(), Some("사과, 배"));
    }

    #[test]
    fn test_normalize_menu_empty() {
        assert_eq!(normalize_menu(""), None);
        assert_eq!(normalize_menu("<br/>(1.2)<br/>"), None);
    }

    #[test]
    fn test_school_payload() {
        let payload = r#"{
            "schoolInfo": [
                {"head": [{"list_total_count": 2}]},
                {"row": [
                    {"SD_SCHUL_CODE": "7010057", "SCHUL_NM": "서울고등학교"},
                    {"SD_SCHUL_CODE": "7010058", "SCHUL_NM": "경복고등학교"}
                ]}
            ]
        }"#;

        let info: SchoolInfo = serde_json::from_str(payload).unwrap();
        let rows: Vec<SchoolRow> = info
            .school_info
            .unwrap()
            .into_iter()
            .flat_map(|section| section.row)
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].code, "7010058");
    }

    #[test]
    fn test_result_payload() {
        let payload = r#"{"RESULT": {"CODE": "INFO-200", "MESSAGE": "해당하는 데이터가 없습니다."}}"#;
        let info: MealInfo = serde_json::from_str(payload).unwrap();

        assert!(info.meal_info.is_none());
        assert!(check_result(info.result).is_ok());

        let payload = r#"{"RESULT": {"CODE": "ERROR-290", "MESSAGE": "인증키가 유효하지 않습니다."}}"#;
        let info: MealInfo = serde_json::from_str(payload).unwrap();

        assert!(matches!(
            check_result(info.result),
            Err(UpstreamError::Api { code, .. }) if code == "ERROR-290"
        ));
    }

    #[tokio::test]
    async fn test_list_schools_sorted_by_name() {
        let source = ScriptedSource::with(&[
            ("3", "다고등학교", None),
            ("1", "가고등학교", None),
            ("2", "나고등학교", None),
        ]);

        let schools = list_schools(&source).await;

        let names: Vec<&str> = schools.iter().map(|school| school.name.as_str()).collect();
        assert_eq!(names, vec!["가고등학교", "나고등학교", "다고등학교"]);
    }
}
