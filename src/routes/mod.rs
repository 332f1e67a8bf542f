use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod clients;
pub mod health;
pub mod schedules;
pub mod technicians;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = trimmed, "ignoring invalid CORS allowed origin");
                        None
                    }
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let schedules_routes = Router::new()
        .route(
            "/",
            get(schedules::list_schedules).post(schedules::create_schedule),
        )
        .route("/generate-services", post(schedules::generate_due_services))
        .route(
            "/:id",
            get(schedules::get_schedule)
                .patch(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route("/:id/toggle", post(schedules::toggle_schedule))
        .route("/:id/preview", get(schedules::preview_occurrences))
        .route(
            "/:id/generate-services",
            post(schedules::generate_schedule_services),
        )
        .route("/:id/services", get(schedules::list_schedule_services));

    let clients_routes =
        Router::new().route("/", get(clients::list_clients).post(clients::create_client));

    let technicians_routes = Router::new().route(
        "/",
        get(technicians::list_technicians).post(technicians::create_technician),
    );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/schedules", schedules_routes)
        .nest("/api/clients", clients_routes)
        .nest("/api/technicians", technicians_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Trims free text; blank input becomes `None`.
pub(crate) fn clean_text(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
