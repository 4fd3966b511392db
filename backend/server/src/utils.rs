use chrono::{Duration, Local, NaiveDate};

use crate::{error::AppError, models::DateWindow};

const DAYS_AROUND: i64 = 3;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Path dates are `YYYY-MM-DD`.
pub fn parse_date(date: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| AppError::InvalidDate(date.to_string()))
}

pub fn format(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Compact form used by the upstream API and as the storage key.
pub fn storage_key(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn date_window(today: NaiveDate) -> DateWindow {
    let dates = (-DAYS_AROUND..=DAYS_AROUND)
        .map(|offset| format(today + Duration::days(offset)))
        .collect();

    DateWindow {
        dates,
        selected_date: format(today),
    }
}
