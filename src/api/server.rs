//! Router assembly and the HTTP listener: dependency-injected state, layered
//! tower middleware.

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{internal, posts, status, users};
use super::types::AppState;
use crate::error::DbError;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Builds the full router with middleware, without binding a listener —
    /// used both by `run` and by in-process tests via `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        let region = self.state.config.region_display_name();

        Router::new()
            .route(
                "/",
                get(move || {
                    let region = region.to_string();
                    async move {
                        Json(json!({
                            "service": "MeshNetwork Backend",
                            "region": region,
                            "version": "1.0.0",
                            "endpoints": {
                                "health": "/health",
                                "status": "/status",
                                "posts": "/api/posts",
                                "users": "/api/users",
                            },
                        }))
                    }
                }),
            )
            .route("/health", get(status::health))
            .route("/status", get(status::status))
            .route("/api/posts", get(posts::list_posts).post(posts::create_post))
            .route(
                "/api/posts/{post_id}",
                get(posts::get_post).put(posts::update_post).delete(posts::delete_post),
            )
            .route("/api/help-requests", get(posts::list_help_requests))
            .route("/api/partitioning/stats", get(posts::partitioning_stats))
            .route("/api/users/{user_id}", get(users::get_user).put(users::update_user))
            .route("/api/users", post(users::create_user))
            .route("/api/mark-safe", post(users::mark_safe))
            .route("/internal/sync", post(internal::receive_sync))
            .route("/internal/changes", get(internal::get_changes))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(self.state.config.request_timeout))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(
                CorsLayer::new()
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_headers(Any)
                    .allow_origin(Any),
            )
    }

    pub async fn run(&self, addr: &str) -> Result<(), DbError> {
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| DbError::Network(format!("failed to bind to {addr}: {e}")))?;

        tracing::info!(addr, "HTTP server listening");

        axum::serve(listener, router)
            .await
            .map_err(|e| DbError::Network(format!("server error: {e}")))?;

        Ok(())
    }
}
