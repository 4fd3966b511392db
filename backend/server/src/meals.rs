use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{error, info};

use crate::{
    database::Store,
    error::{AppError, UpstreamError},
    models::{Meal, NO_MENU, School},
    neis::{MealSource, fetch_menu, list_schools},
};

/// Fetches every school's menu for `date`, stores each as it lands and returns the stored set.
///
/// All per-school fetches run at once. A school whose fetch fails is stored with [`NO_MENU`];
/// only an empty school list fails the whole sync.
pub async fn sync_meals_for_date(
    source: &dyn MealSource,
    store: &dyn Store,
    date: NaiveDate,
) -> Result<Vec<Meal>, AppError> {
    let schools = list_schools(source).await;
    if schools.is_empty() {
        return Err(UpstreamError::NoSchools.into());
    }

    info!("Syncing meals for {date} across {} schools", schools.len());

    join_all(
        schools
            .into_iter()
            .map(|school| sync_school(source, store, school, date)),
    )
    .await;

    Ok(store.meals(date).await?)
}

/// Stored meals for `date`, syncing first when none of them carries a real menu yet.
pub async fn cached_or_sync(
    source: &dyn MealSource,
    store: &dyn Store,
    date: NaiveDate,
) -> Result<Vec<Meal>, AppError> {
    let meals = store.meals(date).await?;
    if meals.iter().any(Meal::has_menu) {
        return Ok(meals);
    }

    sync_meals_for_date(source, store, date).await
}

async fn sync_school(
    source: &dyn MealSource,
    store: &dyn Store,
    school: School,
    date: NaiveDate,
) {
    let lunch_menu = fetch_menu(source, &school.code, date)
        .await
        .unwrap_or_else(|| NO_MENU.to_string());

    let meal = Meal {
        school_code: school.code,
        school_name: school.name,
        lunch_menu,
    };

    if let Err(e) = store.save_meal(date, &meal).await {
        error!("Failed to save meal for {}: {e}", meal.school_code);
    }
}
