pub mod accounts;
pub mod aggregates;
pub mod auth;
pub mod catalogue;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod media;
pub mod models;
pub mod routes;
pub mod userfilms;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    http::{Method, header},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    auth::{LoginLimiter, login_limiter},
    config::Config,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub login_limiter: Arc<LoginLimiter>,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: DatabaseConnection) -> Self {
        let login_limiter = Arc::new(login_limiter(config.login_attempts_per_minute));
        Self { config, db, login_limiter }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allow_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.clone())
            .allow_methods([Method::GET, Method::POST, Method::PATCH])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        None => CorsLayer::new().allow_origin(Any).allow_headers(Any),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/films/", get(routes::list_films))
        .route("/films/{id}/", get(routes::get_film))
        .route("/genres/", get(routes::list_genres))
        .route("/genres/{slug}/", get(routes::get_genre))
        .route("/userfilms/", get(routes::list_userfilms).post(routes::upsert_userfilm))
        .route("/auth/signup/", post(routes::signup))
        .route("/auth/login/", post(routes::login))
        .route("/auth/logout/", post(routes::logout))
        .route("/auth/profile/", get(routes::profile).patch(routes::update_profile));

    let cors = cors_layer(&state.config);
    let media = ServeDir::new(&state.config.media_root);

    Router::new()
        .nest("/api", api)
        .nest_service("/media", media)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
