//! # Redis
//!
//! Owns every persisted record: meals, reviews, reactions and visit counters.
//!
//! ## Layout
//!
//! - `meals:{YYYYMMDD}`: hash, school code to JSON [`Meal`]
//! - `reviews:{YYYYMMDD}`: hash, school code to JSON [`Review`]
//! - `reactions:{YYYYMMDD}`: hash, school code to **likes** int
//! - `visits`: hash, date to **count** int
//!
//! ## Notes
//!
//! - Writes are `HSET`, so a re-fetch overwrites and the (date, school) key stays unique
//! - Counters use `HINCRBY`, which creates the field at zero before incrementing
//! - No business logic lives here; callers decide what a fault means
use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    error::StoreResult,
    models::{Meal, Review},
    utils::storage_key,
};

const VISITS_KEY: &str = "visits";

#[async_trait]
pub trait Store: Send + Sync {
    async fn save_meal(&self, date: NaiveDate, meal: &Meal) -> StoreResult<()>;

    /// Every stored meal for the date, sentinel rows included, ordered by school name.
    async fn meals(&self, date: NaiveDate) -> StoreResult<Vec<Meal>>;

    async fn save_review(&self, date: NaiveDate, school_code: &str, review: &Review)
    -> StoreResult<()>;

    async fn review(&self, date: NaiveDate, school_code: &str) -> StoreResult<Option<Review>>;

    async fn reviews(&self, date: NaiveDate) -> StoreResult<BTreeMap<String, Review>>;

    /// Records one like and returns the new total.
    async fn add_like(&self, date: NaiveDate, school_code: &str) -> StoreResult<u64>;

    async fn likes(&self, date: NaiveDate, school_code: &str) -> StoreResult<u64>;

    async fn reactions(&self, date: NaiveDate) -> StoreResult<BTreeMap<String, u64>>;

    async fn increment_visits(&self, date: NaiveDate) -> StoreResult<u64>;

    async fn visits(&self, date: NaiveDate) -> StoreResult<u64>;

    async fn total_visits(&self) -> StoreResult<u64>;
}

pub async fn init_redis(redis_url: &str) -> StoreResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        Ok(Self {
            connection: init_redis(redis_url).await?,
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn meals_key(date: NaiveDate) -> String {
    format!("meals:{}", storage_key(date))
}

fn reviews_key(date: NaiveDate) -> String {
    format!("reviews:{}", storage_key(date))
}

fn reactions_key(date: NaiveDate) -> String {
    format!("reactions:{}", storage_key(date))
}

pub fn sort_meals(meals: &mut [Meal]) {
    meals.sort_by(|a, b| {
        a.school_name
            .cmp(&b.school_name)
            .then_with(|| a.school_code.cmp(&b.school_code))
    });
}

#[async_trait]
impl Store for RedisStore {
    async fn save_meal(&self, date: NaiveDate, meal: &Meal) -> StoreResult<()> {
        let value = serde_json::to_string(meal)?;
        let _: () = self
            .conn()
            .hset(meals_key(date), &meal.school_code, value)
            .await?;

        Ok(())
    }

    async fn meals(&self, date: NaiveDate) -> StoreResult<Vec<Meal>> {
        let raw: BTreeMap<String, String> = self.conn().hgetall(meals_key(date)).await?;

        let mut meals = raw
            .values()
            .map(|value| serde_json::from_str(value))
            .collect::<Result<Vec<Meal>, _>>()?;
        sort_meals(&mut meals);

        Ok(meals)
    }

    async fn save_review(
        &self,
        date: NaiveDate,
        school_code: &str,
        review: &Review,
    ) -> StoreResult<()> {
        let value = serde_json::to_string(review)?;
        let _: () = self
            .conn()
            .hset(reviews_key(date), school_code, value)
            .await?;

        Ok(())
    }

    async fn review(&self, date: NaiveDate, school_code: &str) -> StoreResult<Option<Review>> {
        let raw: Option<String> = self.conn().hget(reviews_key(date), school_code).await?;

        Ok(raw.map(|value| serde_json::from_str(&value)).transpose()?)
    }

    async fn reviews(&self, date: NaiveDate) -> StoreResult<BTreeMap<String, Review>> {
        let raw: BTreeMap<String, String> = self.conn().hgetall(reviews_key(date)).await?;

        raw.into_iter()
            .map(|(code, value)| Ok((code, serde_json::from_str(&value)?)))
            .collect()
    }

    async fn add_like(&self, date: NaiveDate, school_code: &str) -> StoreResult<u64> {
        Ok(self
            .conn()
            .hincr(reactions_key(date), school_code, 1)
            .await?)
    }

    async fn likes(&self, date: NaiveDate, school_code: &str) -> StoreResult<u64> {
        let likes: Option<u64> = self.conn().hget(reactions_key(date), school_code).await?;

        Ok(likes.unwrap_or(0))
    }

    async fn reactions(&self, date: NaiveDate) -> StoreResult<BTreeMap<String, u64>> {
        Ok(self.conn().hgetall(reactions_key(date)).await?)
    }

    async fn increment_visits(&self, date: NaiveDate) -> StoreResult<u64> {
        Ok(self.conn().hincr(VISITS_KEY, storage_key(date), 1).await?)
    }

    async fn visits(&self, date: NaiveDate) -> StoreResult<u64> {
        let count: Option<u64> = self.conn().hget(VISITS_KEY, storage_key(date)).await?;

        Ok(count.unwrap_or(0))
    }

    async fn total_visits(&self) -> StoreResult<u64> {
        let counts: Vec<u64> = self.conn().hvals(VISITS_KEY).await?;

        Ok(counts.iter().sum())
    }
}
