use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::NaiveDate;
use tokio::sync::Mutex as Gate;
use tracing::info;

use crate::{
    error::AppError,
    generator::Outcome,
    meals::cached_or_sync,
    models::{Reactions, Review, ReviewResponse},
    state::AppState,
};

type Key = (NaiveDate, String);

/// One gate per (date, school) while a review is being generated for it.
#[derive(Default)]
pub struct InFlight {
    gates: Mutex<HashMap<Key, Arc<Gate<()>>>>,
}

impl InFlight {
    fn gates(&self) -> MutexGuard<'_, HashMap<Key, Arc<Gate<()>>>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self, key: &Key) -> Arc<Gate<()>> {
        self.gates().entry(key.clone()).or_default().clone()
    }

    fn finish(&self, key: &Key, gate: &Arc<Gate<()>>) {
        let mut gates = self.gates();
        if gates.get(key).is_some_and(|current| Arc::ptr_eq(current, gate)) {
            gates.remove(key);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.gates().is_empty()
    }
}

/// Clears the key's gate when dropped, including when the request is abandoned mid-generation.
struct Finish<'a> {
    in_flight: &'a InFlight,
    key: &'a Key,
    gate: &'a Arc<Gate<()>>,
}

impl Drop for Finish<'_> {
    fn drop(&mut self) {
        self.in_flight.finish(self.key, self.gate);
    }
}

async fn cached(
    state: &AppState,
    date: NaiveDate,
    school_code: &str,
) -> Result<Option<Review>, AppError> {
    let review = state.store.review(date, school_code).await?;

    Ok(review.filter(|review| !review.error_flag))
}

async fn respond(
    state: &AppState,
    date: NaiveDate,
    school_code: &str,
    review: Review,
) -> Result<ReviewResponse, AppError> {
    let likes = state.store.likes(date, school_code).await?;

    Ok(ReviewResponse {
        review: review.review_text,
        nutri_score: review.nutri_score,
        pref_score: review.pref_score,
        reactions: Reactions { likes },
    })
}

/// Cached review for the key, generating and storing one on a miss.
///
/// Concurrent misses on the same key generate once; the rest wait and read the stored result.
pub async fn review_for(
    state: &AppState,
    date: NaiveDate,
    school_code: &str,
) -> Result<ReviewResponse, AppError> {
    if let Some(review) = cached(state, date, school_code).await? {
        return respond(state, date, school_code, review).await;
    }

    let key = (date, school_code.to_string());
    let gate = state.in_flight.gate(&key);

    let review = {
        let _guard = gate.lock().await;
        let _finish = Finish {
            in_flight: &state.in_flight,
            key: &key,
            gate: &gate,
        };

        match cached(state, date, school_code).await? {
            Some(review) => review,
            None => generate(state, date, school_code).await?,
        }
    };

    respond(state, date, school_code, review).await
}

async fn generate(
    state: &AppState,
    date: NaiveDate,
    school_code: &str,
) -> Result<Review, AppError> {
    let meals = cached_or_sync(state.source.as_ref(), state.store.as_ref(), date).await?;

    let menu = meals
        .into_iter()
        .find(|meal| meal.school_code == school_code && meal.has_menu())
        .map(|meal| meal.lunch_menu)
        .ok_or(AppError::NotFound)?;

    let draft = state.generator.generate_review(&menu).await;
    info!("Generated review for {school_code} on {date}: {:?}", draft.outcome);

    let review = Review {
        review_text: draft.text,
        nutri_score: draft.nutri_score,
        pref_score: draft.pref_score,
        error_flag: draft.outcome == Outcome::Failed,
    };
    state.store.save_review(date, school_code, &review).await?;

    Ok(review)
}
