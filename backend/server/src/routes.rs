use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json,
    extract::{Path, State},
    response::{Html, IntoResponse},
};
use tracing::info;

use crate::{
    error::AppError,
    meals::cached_or_sync,
    models::{CountResponse, Event, Meal, ReactionResponse, Reactions},
    review::review_for,
    state::AppState,
    utils::{date_window, parse_date, today},
};

const LIKE: &str = "like";

pub async fn home_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    state.store.increment_visits(today()).await?;

    let page = tokio::fs::read_to_string(state.config.static_dir.join("index.html")).await?;

    Ok(Html(page))
}

pub async fn meals_handler(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<Vec<Meal>>, AppError> {
    let date = parse_date(&date)?;

    let meals = cached_or_sync(state.source.as_ref(), state.store.as_ref(), date)
        .await?
        .into_iter()
        .filter(Meal::has_menu)
        .collect();

    Ok(Json(meals))
}

pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    Path((date, school_code)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let date = parse_date(&date)?;

    Ok(Json(review_for(&state, date, &school_code).await?))
}

/// Cached reviews for a date by school code, failed generations left out.
pub async fn reviews_handler(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let date = parse_date(&date)?;

    let reviews: BTreeMap<_, _> = state
        .store
        .reviews(date)
        .await?
        .into_iter()
        .filter(|(_, review)| !review.error_flag)
        .collect();

    Ok(Json(reviews))
}

pub async fn reaction_handler(
    State(state): State<Arc<AppState>>,
    Path((date, school_code, reaction)): Path<(String, String, String)>,
) -> Result<Json<ReactionResponse>, AppError> {
    if reaction != LIKE {
        return Err(AppError::InvalidReaction(reaction));
    }
    let date = parse_date(&date)?;

    let likes = state.store.add_like(date, &school_code).await?;
    info!("Like recorded for {school_code} on {date}, now {likes}");

    state.registry.broadcast_event(&Event::Reaction {
        school_code: school_code.clone(),
        likes,
    });

    Ok(Json(ReactionResponse { school_code, likes }))
}

pub async fn reactions_handler(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<BTreeMap<String, Reactions>>, AppError> {
    let date = parse_date(&date)?;

    let reactions = state
        .store
        .reactions(date)
        .await?
        .into_iter()
        .map(|(school_code, likes)| (school_code, Reactions { likes }))
        .collect();

    Ok(Json(reactions))
}

pub async fn today_visits_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.store.visits(today()).await?;

    Ok(Json(CountResponse { count }))
}

pub async fn total_visits_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.store.total_visits().await?;

    Ok(Json(CountResponse { count }))
}

pub async fn dates_handler() -> impl IntoResponse {
    Json(date_window(today()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use chrono::NaiveDate;
    use serde_json::{Value, json};
    use tokio::sync::mpsc::unbounded_channel;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        app,
        config::Config,
        generator::{NO_ANALYSIS_TEXT, tests::Scripted},
        meals::tests::ScriptedSource,
        memory::MemoryStore,
        models::Review,
    };

    const SCHOOL: &str = "7010057";

    fn state(completion: Arc<Scripted>) -> Arc<AppState> {
        AppState::from_parts(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedSource::with(&[
                (SCHOOL, "서울고등학교", Some("김치볶음밥, 된장국")),
                ("7010058", "경복고등학교", None),
            ])),
            completion,
        )
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_review_generated_on_miss() {
        let completion = Scripted::new(Some(
            "김치볶음밥은 학생들이 좋아하는 메뉴입니다.\n#NUTRI_RATE:3.5\n#PREF_RATE:4.5",
        ));
        let state = state(completion.clone());

        let (status, body) = call(app(state.clone()), "GET", "/api/review/2024-06-10/7010057").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "review": "김치볶음밥은 학생들이 좋아하는 메뉴입니다.",
                "nutri_score": 3.5,
                "pref_score": 4.5,
                "reactions": { "likes": 0 }
            })
        );

        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let stored = state.store.reviews(date).await.unwrap();
        assert_eq!(stored.len(), 1);

        let (status, _) = call(app(state.clone()), "GET", "/api/review/2024-06-10/7010057").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_review_without_menu() {
        let state = state(Scripted::new(Some("")));

        let (status, _) = call(app(state.clone()), "GET", "/api/review/2024-06-10/7010058").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(app(state), "GET", "/api/review/06-10-2024/7010057").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_review_with_empty_analysis() {
        let state = state(Scripted::new(Some("#NUTRI_RATE:5\n#PREF_RATE:5")));

        let (status, body) = call(app(state), "GET", "/api/review/2024-06-10/7010057").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review"], NO_ANALYSIS_TEXT);
        assert_eq!(body["nutri_score"], 3.0);
    }

    #[tokio::test]
    async fn test_meals_hide_missing_menus() {
        let state = state(Scripted::new(None));

        let (status, body) = call(app(state), "GET", "/api/meals/2024-06-10").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{
                "school_code": SCHOOL,
                "school_name": "서울고등학교",
                "lunch_menu": "김치볶음밥, 된장국"
            }])
        );
    }

    #[tokio::test]
    async fn test_meals_without_upstream_schools() {
        let state = AppState::from_parts(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedSource::default()),
            Scripted::new(None),
        );

        let (status, body) = call(app(state), "GET", "/api/meals/2024-06-10").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "detail": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_likes_accumulate_and_broadcast() {
        let state = state(Scripted::new(None));
        let (outbox, mut inbox) = unbounded_channel();
        state.registry.connect("watcher", outbox);
        inbox.try_recv().unwrap();

        for expected in 1..=3 {
            let (status, body) =
                call(app(state.clone()), "POST", "/api/reaction/2024-06-10/7010057/like").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({ "school_code": SCHOOL, "likes": expected }));

            let frame: Value = serde_json::from_str(&inbox.try_recv().unwrap()).unwrap();
            assert_eq!(
                frame,
                json!({ "type": "reaction", "school_code": SCHOOL, "likes": expected })
            );
        }

        let (_, body) = call(app(state), "GET", "/api/reactions/2024-06-10").await;
        assert_eq!(body, json!({ "7010057": { "likes": 3 } }));
    }

    #[tokio::test]
    async fn test_invalid_reaction_type() {
        let state = state(Scripted::new(None));

        let (status, _) =
            call(app(state.clone()), "POST", "/api/reaction/2024-06-10/7010057/dislike").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(app(state), "GET", "/api/reactions/2024-06-10").await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_reviews_skip_failed_generations() {
        let state = state(Scripted::new(None));
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let review = |error_flag| Review {
            review_text: "리뷰".to_string(),
            nutri_score: 4.0,
            pref_score: 4.0,
            error_flag,
        };
        state.store.save_review(date, "1", &review(false)).await.unwrap();
        state.store.save_review(date, "2", &review(true)).await.unwrap();

        let (_, body) = call(app(state), "GET", "/api/reviews/2024-06-10").await;

        let codes: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(codes, vec!["1"]);
    }

    #[tokio::test]
    async fn test_visit_counts() {
        let state = state(Scripted::new(None));
        state.store.increment_visits(today()).await.unwrap();
        state.store.increment_visits(today()).await.unwrap();
        let yesterday = today().pred_opt().unwrap();
        state.store.increment_visits(yesterday).await.unwrap();

        let (_, body) = call(app(state.clone()), "GET", "/api/visits/today").await;
        assert_eq!(body, json!({ "count": 2 }));

        let (_, body) = call(app(state), "GET", "/api/visits/total").await;
        assert_eq!(body, json!({ "count": 3 }));
    }

    #[tokio::test]
    async fn test_dates_window() {
        let state = state(Scripted::new(None));

        let (status, body) = call(app(state), "GET", "/api/dates").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dates"].as_array().unwrap().len(), 7);
        assert_eq!(body["dates"][3], body["selected_date"]);
    }
}
