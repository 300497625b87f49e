pub mod auth;
pub mod error;
mod photos;
mod plans;
mod progress;
mod reports;
mod students;
mod suggestions;
mod teachers;
mod validation;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::access::{can_access, Actor, Target};
use crate::AppState;
use error::ApiError;

/// Room for multipart boundaries and part headers around the photo itself
const MULTIPART_OVERHEAD: usize = 16 * 1024;

/// Turn a denied access check into a 403
pub(crate) fn ensure_access(actor: &Actor, target: Target, message: &str) -> Result<(), ApiError> {
    if can_access(actor, target) {
        Ok(())
    } else {
        Err(ApiError::forbidden(message))
    }
}

fn plan_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(plans::list_plans).post(plans::create_plan))
        .route(
            "/:id",
            get(plans::get_plan).put(plans::update_plan).delete(plans::delete_plan),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.photos.max_upload_bytes() + MULTIPART_OVERHEAD;

    // Public
    let public_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register));

    // Protected API routes
    let api_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        // Teachers
        .route("/teachers", get(teachers::list_teachers))
        .route(
            "/teachers/:id",
            put(teachers::update_teacher).delete(teachers::delete_teacher),
        )
        // Students
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route(
            "/students/:id",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route(
            "/students/:id/photo",
            post(photos::upload_photo)
                .delete(photos::delete_photo)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Progress
        .route(
            "/progress",
            get(progress::list_progress).post(progress::create_progress),
        )
        .route(
            "/progress/:id",
            get(progress::get_progress)
                .put(progress::update_progress)
                .delete(progress::delete_progress),
        )
        // Teaching plans
        .nest("/plans", plan_routes())
        .nest("/teaching-plans", plan_routes())
        // Reports
        .route("/reports/pdf", post(reports::pdf_report))
        .route("/reports/excel", post(reports::excel_report))
        // AI
        .route("/ai-suggestions", post(suggestions::create_suggestion))
        // Protected by session
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ))
        .merge(public_routes);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .nest_service("/uploads", ServeDir::new(state.photos.uploads_dir()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
