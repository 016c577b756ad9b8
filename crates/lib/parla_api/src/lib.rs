//! # parla_api
//!
//! HTTP API library for Parla.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use parla_core::auth::service::AuthService;
use parla_core::chat::ChatProvider;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{auth, chat, conversations, scenarios};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool.
    pub pool: PgPool,
    /// API configuration.
    pub config: ApiConfig,
    /// Authentication use cases.
    pub auth: AuthService,
    /// Chat completion and speech provider.
    pub chat: Arc<dyn ChatProvider>,
}

/// Run embedded database migrations.
///
/// Delegates to `parla_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    parla_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler));

    // Protected routes (require a session)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::GET_SCENARIOS, get(scenarios::list_scenarios_handler))
        .route(routes::GET_SCENARIOS_SLUG, get(scenarios::get_scenario_handler))
        .route(
            routes::CONVERSATIONS,
            get(conversations::list_conversations_handler)
                .post(conversations::create_conversation_handler),
        )
        .route(
            routes::CONVERSATIONS_ID,
            get(conversations::get_conversation_handler)
                .delete(conversations::delete_conversation_handler),
        )
        .route(
            routes::POST_CONVERSATIONS_ID_MESSAGES,
            post(chat::send_message_handler),
        )
        .route(routes::POST_MESSAGES_ID_SPEECH, post(chat::speech_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
