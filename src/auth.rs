use std::{num::NonZeroU32, sync::Arc};

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use cookie::{Cookie, SameSite};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait, QueryFilter, Set};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    AppState,
    entities::{session, user},
    error::{AppError, AppResult},
};

pub const SESSION_COOKIE: &str = "sessionid";

/// Stale limiter keys are swept once this many emails are tracked.
const LIMITER_SWEEP_AT: usize = 4096;

type KeyedLimiter<C> =
    RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Login attempts per email address.
pub type LoginLimiter = KeyedLimiter<DefaultClock>;

pub fn login_limiter(per_minute: u32) -> LoginLimiter {
    login_limiter_with_clock(per_minute, DefaultClock::default())
}

fn login_limiter_with_clock<C: Clock>(per_minute: u32, clock: C) -> KeyedLimiter<C> {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));
    RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock)
}

pub fn check_login_quota<C: Clock>(limiter: &KeyedLimiter<C>, email: &str) -> AppResult<()> {
    if limiter.len() >= LIMITER_SWEEP_AT {
        limiter.retain_recent();
        limiter.shrink_to_fit();
        debug!(remaining = limiter.len(), "swept login limiter");
    }
    limiter.check_key(&email.trim().to_lowercase()).map_err(|_| AppError::TooManyRequests)
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

pub async fn start_session<C>(db: &C, user_id: i32, ttl_seconds: i64) -> AppResult<String>
where
    C: ConnectionTrait,
{
    let swept = session::Entity::delete_many()
        .filter(session::Column::ExpiresAt.lt(now_sec()))
        .exec(db)
        .await?;
    if swept.rows_affected > 0 {
        info!(count = swept.rows_affected, "removed expired sessions");
    }

    let token = Uuid::new_v4().simple().to_string();
    let model = session::ActiveModel {
        token: Set(token.clone()),
        user_id: Set(user_id),
        expires_at: Set(now_sec() + ttl_seconds),
    };
    session::Entity::insert(model).exec_without_returning(db).await?;
    debug!(user_id, "session started");
    Ok(token)
}

/// Resolves a session token to its user. Expired sessions are removed and
/// treated as anonymous.
pub async fn resolve_session<C>(db: &C, token: &str) -> AppResult<Option<user::Model>>
where
    C: ConnectionTrait,
{
    let Some(session) = session::Entity::find_by_id(token.to_string()).one(db).await? else {
        return Ok(None);
    };
    if session.expires_at < now_sec() {
        debug!(user_id = session.user_id, "session expired");
        session.delete(db).await?;
        return Ok(None);
    }
    Ok(session.find_related(user::Entity).one(db).await?)
}

pub async fn end_session<C>(db: &C, token: &str) -> AppResult<()>
where
    C: ConnectionTrait,
{
    session::Entity::delete_many().filter(session::Column::Token.eq(token)).exec(db).await?;
    Ok(())
}

pub fn session_cookie(token: String, ttl_seconds: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(ttl_seconds))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

/// The caller's identity, if the request carries a live session cookie.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Option<user::Model>);

impl CurrentUser {
    pub fn require(self) -> AppResult<user::Model> {
        self.0.ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Ok(Self(None));
        };
        Ok(Self(resolve_session(&state.db, &token).await?))
    }
}

/// Rejects anonymous callers with 401 before the handler runs.
#[derive(Clone, Debug)]
pub struct AuthUser(pub user::Model);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        CurrentUser::from_request_parts(parts, state).await?.require().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use governor::clock::FakeRelativeClock;

    use super::*;
    use crate::test_utils::{seed_user, setup_test_db};

    #[tokio::test]
    async fn session_round_trip() {
        let db = setup_test_db().await;
        let user = seed_user(&db, "ana@example.com", "ana").await;

        let token = start_session(&db, user.id, 3600).await.unwrap();
        let resolved = resolve_session(&db, &token).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));

        end_session(&db, &token).await.unwrap();
        assert!(resolve_session(&db, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_anonymous_and_removed() {
        let db = setup_test_db().await;
        let user = seed_user(&db, "ana@example.com", "ana").await;

        let token = start_session(&db, user.id, -10).await.unwrap();
        assert!(resolve_session(&db, &token).await.unwrap().is_none());
        assert!(session::Entity::find_by_id(token).one(&db).await.unwrap().is_none());
    }

    #[test]
    fn login_quota_is_per_email() {
        let limiter = login_limiter(2);
        assert!(check_login_quota(&limiter, "ana@example.com").is_ok());
        assert!(check_login_quota(&limiter, "ANA@example.com").is_ok());
        assert!(matches!(
            check_login_quota(&limiter, "ana@example.com"),
            Err(AppError::TooManyRequests)
        ));
        assert!(check_login_quota(&limiter, "bob@example.com").is_ok());
    }

    #[tokio::test]
    async fn starting_a_session_sweeps_expired_ones() {
        let db = setup_test_db().await;
        let ana = seed_user(&db, "ana@example.com", "ana").await;
        let bob = seed_user(&db, "bob@example.com", "bob").await;

        let stale = start_session(&db, ana.id, -10).await.unwrap();
        let live = start_session(&db, ana.id, 3600).await.unwrap();
        start_session(&db, bob.id, 3600).await.unwrap();

        assert!(session::Entity::find_by_id(stale).one(&db).await.unwrap().is_none());
        assert!(session::Entity::find_by_id(live).one(&db).await.unwrap().is_some());
        assert_eq!(session::Entity::find().all(&db).await.unwrap().len(), 2);
    }

    #[test]
    fn idle_limiter_keys_are_swept() {
        let clock = FakeRelativeClock::default();
        let limiter = login_limiter_with_clock(1, clock.clone());

        for i in 0..LIMITER_SWEEP_AT {
            check_login_quota(&limiter, &format!("user{i}@example.com")).unwrap();
        }
        assert_eq!(limiter.len(), LIMITER_SWEEP_AT);
        assert!(check_login_quota(&limiter, "user0@example.com").is_err());

        clock.advance(Duration::from_secs(120));
        check_login_quota(&limiter, "fresh@example.com").unwrap();
        assert_eq!(limiter.len(), 1);
        assert!(check_login_quota(&limiter, "user0@example.com").is_ok());
    }

    #[test]
    fn recent_limiter_keys_survive_a_sweep() {
        let clock = FakeRelativeClock::default();
        let limiter = login_limiter_with_clock(1, clock.clone());

        for i in 0..LIMITER_SWEEP_AT {
            check_login_quota(&limiter, &format!("user{i}@example.com")).unwrap();
        }
        clock.advance(Duration::from_secs(10));
        assert!(matches!(
            check_login_quota(&limiter, "user0@example.com"),
            Err(AppError::TooManyRequests)
        ));
        assert_eq!(limiter.len(), LIMITER_SWEEP_AT);
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("abc".into(), 60);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
