use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(handlers::get_state))
        .route("/api/increment", post(handlers::increment))
        .route("/api/reset", post(handlers::reset))
        .route("/api/goal", post(handlers::set_goal))
        .route("/api/complete", post(handlers::complete))
        .route("/api/active", post(handlers::switch_active))
        .route(
            "/api/counters",
            get(handlers::list_counters).post(handlers::add_counter),
        )
        .route(
            "/api/counters/:id",
            patch(handlers::update_counter).delete(handlers::delete_counter),
        )
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::add_session),
        )
        .route("/api/sessions/:id", delete(handlers::delete_session))
        .route("/api/stats", get(handlers::get_stats))
        .route(
            "/api/preferences",
            get(handlers::get_preferences).put(handlers::put_preferences),
        )
        .route("/api/preferences/sound", post(handlers::toggle_sound))
        .route("/api/preferences/haptics", post(handlers::toggle_haptics))
        .with_state(state)
}
