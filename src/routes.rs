use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    AppState, accounts,
    auth::{self, AuthUser},
    catalogue::{self, FilmQuery},
    error::{AppError, AppResult, ValidationErrors},
    models::{
        FilmResponse, GenreResponse, LoginRequest, Page, ProfileResponse, ProfileUpdate,
        SignupRequest, StatusResponse, UpsertUserFilm, UserFilmResponse, UserResponse,
    },
    userfilms,
};

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            Err(ValidationErrors::single("non_field_errors", "parse_error", rejection.body_text())
                .into())
        },
    }
}

pub async fn list_films(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilmQuery>,
) -> AppResult<Json<Page<FilmResponse>>> {
    let page = catalogue::list_films(&state.db, &query).await?;
    Ok(Json(page.map(|view| FilmResponse::new(view, &state.config.media_url))))
}

pub async fn get_film(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<FilmResponse>> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound("Film"))?;
    let view = catalogue::get_film(&state.db, id).await?;
    Ok(Json(FilmResponse::new(view, &state.config.media_url)))
}

pub async fn list_genres(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<GenreResponse>>> {
    let genres = catalogue::list_genres(&state.db).await?;
    Ok(Json(
        genres.into_iter().map(|view| GenreResponse::new(view, &state.config.media_url)).collect(),
    ))
}

pub async fn get_genre(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> AppResult<Json<GenreResponse>> {
    let view = catalogue::get_genre(&state.db, &slug).await?;
    Ok(Json(GenreResponse::new(view, &state.config.media_url)))
}

pub async fn list_userfilms(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<UserFilmResponse>>> {
    let rows = userfilms::list_for_user(&state.db, user.id).await?;
    Ok(Json(
        rows.into_iter().map(|view| UserFilmResponse::new(view, &state.config.media_url)).collect(),
    ))
}

pub async fn upsert_userfilm(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<StatusResponse>> {
    let cmd = UpsertUserFilm::from_json(&json_body(body)?)?;
    let outcome = userfilms::upsert(&state.db, user.id, cmd).await?;
    Ok(Json(outcome.into()))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let user = accounts::signup(&state.db, json_body(body)?).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let req = json_body(body)?;
    let email = req.email.unwrap_or_default();
    let password = req.password.unwrap_or_default();

    auth::check_login_quota(&state.login_limiter, &email)?;

    let Some(user) = accounts::authenticate(&state.db, &email, &password).await? else {
        return Ok((jar, Json(json!({ "login": "fail" }))));
    };

    let ttl = state.config.session_ttl_seconds();
    let token = auth::start_session(&state.db, user.id, ttl).await?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok((jar.add(auth::session_cookie(token, ttl)), Json(json!({ "login": "success" }))))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    if let Some(cookie) = jar.get(auth::SESSION_COOKIE) {
        auth::end_session(&state.db, cookie.value()).await?;
    }
    Ok((jar.remove(auth::removal_cookie()), Json(json!({ "logout": "success" }))))
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Json<ProfileResponse> {
    Json(ProfileResponse::new(user, &state.config.media_url))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> AppResult<Json<ProfileResponse>> {
    let user = accounts::update_profile(&state.db, user, json_body(body)?).await?;
    Ok(Json(ProfileResponse::new(user, &state.config.media_url)))
}
