use crate::controller::SessionController;
use crate::errors::AppError;
use crate::models::{
    ActiveCounterRequest, Counter, CounterUpdate, GoalRequest, NewCounter, NewSession,
    Preferences, Session, StateResponse, StatsResponse,
};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

fn to_response(controller: &SessionController) -> StateResponse {
    StateResponse {
        counters: controller.counters().to_vec(),
        active_counter: controller.active_counter().cloned(),
        current_count: controller.current_count(),
        current_goal: controller.current_goal(),
        syncing: controller.syncing(),
        sound_enabled: controller.sound_enabled(),
        haptics_enabled: controller.haptics_enabled(),
    }
}

pub async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    let controller = state.controller.lock().await;
    Json(to_response(&controller))
}

pub async fn increment(State(state): State<AppState>) -> Result<Json<StateResponse>, AppError> {
    let mut controller = state.controller.lock().await;
    controller.increment()?;
    Ok(Json(to_response(&controller)))
}

pub async fn reset(State(state): State<AppState>) -> Result<Json<StateResponse>, AppError> {
    let mut controller = state.controller.lock().await;
    controller.reset()?;
    Ok(Json(to_response(&controller)))
}

pub async fn set_goal(
    State(state): State<AppState>,
    Json(payload): Json<GoalRequest>,
) -> Result<Json<StateResponse>, AppError> {
    let mut controller = state.controller.lock().await;
    controller.set_goal(payload.goal)?;
    Ok(Json(to_response(&controller)))
}

pub async fn complete(State(state): State<AppState>) -> Result<Json<Option<Session>>, AppError> {
    let mut controller = state.controller.lock().await;
    Ok(Json(controller.complete_session()?))
}

pub async fn switch_active(
    State(state): State<AppState>,
    Json(payload): Json<ActiveCounterRequest>,
) -> Result<Json<StateResponse>, AppError> {
    let mut controller = state.controller.lock().await;
    controller.switch_active_counter(payload.counter_id.trim())?;
    Ok(Json(to_response(&controller)))
}

pub async fn list_counters(State(state): State<AppState>) -> Json<Vec<Counter>> {
    let controller = state.controller.lock().await;
    Json(controller.counters().to_vec())
}

// The remote step of a counter change runs with the controller unlocked so
// increments keep flowing while the backend answers.
pub async fn add_counter(
    State(state): State<AppState>,
    Json(payload): Json<NewCounter>,
) -> Result<(StatusCode, Json<Counter>), AppError> {
    let sync = {
        let controller = state.controller.lock().await;
        controller.check_new_counter(&payload)?;
        controller.counter_sync()
    };
    let created = match sync {
        Some(sync) => sync.create(payload.clone()).await,
        None => None,
    };

    let mut controller = state.controller.lock().await;
    let counter = controller.insert_counter(payload, created)?;
    Ok((StatusCode::CREATED, Json(counter)))
}

pub async fn update_counter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CounterUpdate>,
) -> Result<Json<Counter>, AppError> {
    if payload.is_empty() {
        return Err(AppError::bad_request("nothing to update"));
    }
    let sync = {
        let controller = state.controller.lock().await;
        controller.check_counter_update(&id, &payload)?;
        controller.counter_sync()
    };
    if let Some(sync) = sync {
        sync.update(&id, payload.clone()).await;
    }

    let mut controller = state.controller.lock().await;
    Ok(Json(controller.apply_counter_update(&id, &payload)?))
}

pub async fn delete_counter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let sync = {
        let controller = state.controller.lock().await;
        controller.check_counter_delete(&id)?;
        controller.counter_sync()
    };
    if let Some(sync) = sync {
        sync.delete(&id).await;
    }

    let mut controller = state.controller.lock().await;
    controller.remove_counter(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    let controller = state.controller.lock().await;
    Json(controller.sessions().to_vec())
}

pub async fn add_session(
    State(state): State<AppState>,
    Json(payload): Json<NewSession>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let mut controller = state.controller.lock().await;
    let session = controller.save_session_manually(payload)?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let mut controller = state.controller.lock().await;
    match controller.delete_session(&id)? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::not_found(format!("unknown session: {id}"))),
    }
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let controller = state.controller.lock().await;
    Json(StatsResponse {
        daily: controller.stats().to_vec(),
        summary: controller.summary(),
    })
}

pub async fn get_preferences(State(state): State<AppState>) -> Json<Preferences> {
    let controller = state.controller.lock().await;
    Json(Preferences {
        dark_mode: controller.dark_mode(),
    })
}

pub async fn put_preferences(
    State(state): State<AppState>,
    Json(payload): Json<Preferences>,
) -> Result<Json<Preferences>, AppError> {
    let controller = state.controller.lock().await;
    controller.set_dark_mode(payload.dark_mode)?;
    Ok(Json(payload))
}

pub async fn toggle_sound(State(state): State<AppState>) -> Json<StateResponse> {
    let mut controller = state.controller.lock().await;
    controller.toggle_sound();
    Json(to_response(&controller))
}

pub async fn toggle_haptics(State(state): State<AppState>) -> Json<StateResponse> {
    let mut controller = state.controller.lock().await;
    controller.toggle_haptics();
    Json(to_response(&controller))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::remote::{fake::FakeRemote, RemoteAdapter};
    use crate::storage::LocalStore;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    async fn signed_in(fake: Arc<FakeRemote>) -> AppState {
        fake.counters.lock().unwrap().push(Counter {
            id: "r1".into(),
            user_id: Some("u1".into()),
            name: "one".into(),
            color: "gold".into(),
            icon: "star".into(),
            created_at: "2026-01-01T00:00:00.000Z".into(),
        });
        let mut controller =
            SessionController::new(LocalStore::in_memory(), Some(RemoteAdapter::new(fake)));
        controller.initialize(Identity::user("u1")).await.unwrap();
        AppState::new(controller)
    }

    fn new_counter(name: &str) -> NewCounter {
        NewCounter {
            id: None,
            name: name.into(),
            color: "green".into(),
            icon: "leaf".into(),
        }
    }

    #[tokio::test]
    async fn slow_counter_create_does_not_hold_up_increments() {
        let fake = Arc::new(FakeRemote::default());
        let state = signed_in(fake.clone()).await;
        fake.write_delay_ms.store(5_000, Ordering::SeqCst);

        let adding = tokio::spawn(add_counter(
            State(state.clone()),
            Json(new_counter("سبحان الله وبحمده")),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let incremented =
            tokio::time::timeout(Duration::from_secs(1), increment(State(state.clone()))).await;
        assert!(matches!(incremented, Ok(Ok(_))));
        assert!(!adding.is_finished());
        assert_eq!(state.controller.lock().await.current_count(), 1);
        adding.abort();
    }

    #[tokio::test]
    async fn counter_create_keeps_the_server_row() {
        let fake = Arc::new(FakeRemote::default());
        let state = signed_in(fake.clone()).await;

        let response = add_counter(State(state.clone()), Json(new_counter("الحمد لله"))).await;
        let Ok((status, Json(counter))) = response else {
            panic!("counter was not created");
        };
        assert_eq!(status, StatusCode::CREATED);
        assert!(counter.id.starts_with("srv-"));
        assert_eq!(state.controller.lock().await.counters().len(), 2);

        let deleted = delete_counter(State(state.clone()), Path(counter.id.clone())).await;
        assert!(matches!(deleted, Ok(status) if status == StatusCode::NO_CONTENT));
        state.controller.lock().await.flush_remote().await;
        assert!(fake.counters().iter().all(|c| c.id != counter.id));
    }

    #[test]
    fn request_body_cannot_choose_the_counter_id() {
        let payload: NewCounter = serde_json::from_value(serde_json::json!({
            "id": "taken",
            "name": "الله أكبر",
            "color": "gold",
            "icon": "star"
        }))
        .unwrap();
        assert_eq!(payload.id, None);
    }
}
