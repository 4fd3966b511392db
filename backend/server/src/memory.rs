use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::{
    database::{Store, sort_meals},
    error::StoreResult,
    models::{Meal, Review},
};

#[derive(Default)]
struct Tables {
    meals: HashMap<NaiveDate, BTreeMap<String, Meal>>,
    reviews: HashMap<NaiveDate, BTreeMap<String, Review>>,
    reactions: HashMap<NaiveDate, BTreeMap<String, u64>>,
    visits: BTreeMap<NaiveDate, u64>,
}

/// Process-local store, used when no redis is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_meal(&self, date: NaiveDate, meal: &Meal) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .meals
            .entry(date)
            .or_default()
            .insert(meal.school_code.clone(), meal.clone());

        Ok(())
    }

    async fn meals(&self, date: NaiveDate) -> StoreResult<Vec<Meal>> {
        let mut meals: Vec<Meal> = self
            .tables
            .lock()
            .await
            .meals
            .get(&date)
            .map(|meals| meals.values().cloned().collect())
            .unwrap_or_default();
        sort_meals(&mut meals);

        Ok(meals)
    }

    async fn save_review(
        &self,
        date: NaiveDate,
        school_code: &str,
        review: &Review,
    ) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .reviews
            .entry(date)
            .or_default()
            .insert(school_code.to_string(), review.clone());

        Ok(())
    }

    async fn review(&self, date: NaiveDate, school_code: &str) -> StoreResult<Option<Review>> {
        Ok(self
            .tables
            .lock()
            .await
            .reviews
            .get(&date)
            .and_then(|reviews| reviews.get(school_code))
            .cloned())
    }

    async fn reviews(&self, date: NaiveDate) -> StoreResult<BTreeMap<String, Review>> {
        Ok(self
            .tables
            .lock()
            .await
            .reviews
            .get(&date)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_like(&self, date: NaiveDate, school_code: &str) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let likes = tables
            .reactions
            .entry(date)
            .or_default()
            .entry(school_code.to_string())
            .or_insert(0);
        *likes += 1;

        Ok(*likes)
    }

    async fn likes(&self, date: NaiveDate, school_code: &str) -> StoreResult<u64> {
        Ok(self
            .tables
            .lock()
            .await
            .reactions
            .get(&date)
            .and_then(|reactions| reactions.get(school_code))
            .copied()
            .unwrap_or(0))
    }

    async fn reactions(&self, date: NaiveDate) -> StoreResult<BTreeMap<String, u64>> {
        Ok(self
            .tables
            .lock()
            .await
            .reactions
            .get(&date)
            .cloned()
            .unwrap_or_default())
    }

    async fn increment_visits(&self, date: NaiveDate) -> StoreResult<u64> {
        let mut tables = self.tables.lock().await;
        let count = tables.visits.entry(date).or_insert(0);
        *count += 1;

        Ok(*count)
    }

    async fn visits(&self, date: NaiveDate) -> StoreResult<u64> {
        Ok(self
            .tables
            .lock()
            .await
            .visits
            .get(&date)
            .copied()
            .unwrap_or(0))
    }

    async fn total_visits(&self) -> StoreResult<u64> {
        Ok(self.tables.lock().await.visits.values().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn meal(code: &str, name: &str, menu: &str) -> Meal {
        Meal {
            school_code: code.to_string(),
            school_name: name.to_string(),
            lunch_menu: menu.to_string(),
        }
    }

    #[tokio::test]
    async fn test_likes_count_up_from_zero() {
        let store = MemoryStore::new();

        assert_eq!(store.likes(date(), "7010057").await.unwrap(), 0);
        assert!(store.reactions(date()).await.unwrap().is_empty());

        for expected in 1..=5 {
            assert_eq!(store.add_like(date(), "7010057").await.unwrap(), expected);
        }

        assert_eq!(store.likes(date(), "7010057").await.unwrap(), 5);
        let reactions = store.reactions(date()).await.unwrap();
        assert_eq!(reactions.get("7010057"), Some(&5));
    }

    #[tokio::test]
    async fn test_meal_upsert_overwrites() {
        let store = MemoryStore::new();

        store.save_meal(date(), &meal("2", "나", "밥")).await.unwrap();
        store.save_meal(date(), &meal("1", "가", "국")).await.unwrap();
        store.save_meal(date(), &meal("2", "나", "죽")).await.unwrap();

        let meals = store.meals(date()).await.unwrap();
        assert_eq!(meals, vec![meal("1", "가", "국"), meal("2", "나", "죽")]);
    }

    #[tokio::test]
    async fn test_visits() {
        let store = MemoryStore::new();
        let tomorrow = date().succ_opt().unwrap();

        store.increment_visits(date()).await.unwrap();
        store.increment_visits(date()).await.unwrap();
        assert_eq!(store.increment_visits(tomorrow).await.unwrap(), 1);

        assert_eq!(store.visits(date()).await.unwrap(), 2);
        assert_eq!(store.total_visits().await.unwrap(), 3);
    }
}
