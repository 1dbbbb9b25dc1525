use anyhow::Context;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, info};

use crate::{
    entities::user,
    error::{AppError, AppResult, ValidationErrors, unique_violation},
    media,
    models::{ProfileUpdate, SignupRequest},
};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_FIELD_LEN: usize = 150;

const EMAIL_TAKEN: &str = "A user with this email already exists.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";

async fn hash_password(password: String) -> AppResult<String> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow::anyhow!("hashing password: {e}"))
    })
    .await
    .context("password hashing task")??;
    Ok(hash)
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let ok = tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    })
    .await
    .context("password verification task")?;
    Ok(ok)
}

/// Usernames never contain spaces; they are removed rather than rejected.
pub fn normalize_username(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

fn check_username(errors: &mut ValidationErrors, username: &str) {
    if username.is_empty() {
        errors.add("username", "required", "This field may not be blank.");
    } else if username.chars().count() > MAX_FIELD_LEN {
        errors.add(
            "username",
            "max_length",
            "Ensure this field has no more than 150 characters.",
        );
    }
}

fn check_password(errors: &mut ValidationErrors, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            "min_length",
            format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
        );
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

async fn username_taken<C>(db: &C, username: &str, except: Option<i32>) -> AppResult<bool>
where
    C: ConnectionTrait,
{
    let mut query = user::Entity::find().filter(user::Column::Username.eq(username));
    if let Some(id) = except {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.one(db).await?.is_some())
}

/// A concurrent signup can claim the email or username after the pre-check.
fn user_taken(err: DbErr) -> AppError {
    unique_violation(err, |detail| {
        if detail.contains("email") {
            ("email", EMAIL_TAKEN)
        } else {
            ("username", USERNAME_TAKEN)
        }
    })
}

pub async fn find_by_email<C>(db: &C, email: &str) -> AppResult<Option<user::Model>>
where
    C: ConnectionTrait,
{
    Ok(user::Entity::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await?)
}

pub async fn signup<C>(db: &C, req: SignupRequest) -> AppResult<user::Model>
where
    C: ConnectionTrait,
{
    let mut errors = ValidationErrors::new();

    let email = req.email.as_deref().map(str::trim).unwrap_or_default().to_lowercase();
    if email.is_empty() {
        errors.add("email", "required", "This field is required.");
    } else if email.chars().count() > MAX_FIELD_LEN || !looks_like_email(&email) {
        errors.add("email", "invalid", "Enter a valid email address.");
    }

    let username = normalize_username(req.username.as_deref().unwrap_or_default());
    check_username(&mut errors, &username);

    let password = req.password.unwrap_or_default();
    check_password(&mut errors, &password);

    if errors.is_empty() {
        if find_by_email(db, &email).await?.is_some() {
            errors.add("email", "unique", EMAIL_TAKEN);
        }
        if username_taken(db, &username, None).await? {
            errors.add("username", "unique", USERNAME_TAKEN);
        }
    }
    errors.into_result()?;

    let user = user::ActiveModel {
        id: Default::default(),
        email: Set(email),
        username: Set(username),
        password_hash: Set(hash_password(password).await?),
        avatar: Set(None),
        date_joined: Set(jiff::Timestamp::now().as_second()),
    }
    .insert(db)
    .await
    .map_err(user_taken)?;

    info!(user_id = user.id, "user signed up");
    Ok(user)
}

/// Returns the user only when the email exists and the password matches.
pub async fn authenticate<C>(
    db: &C,
    email: &str,
    password: &str,
) -> AppResult<Option<user::Model>>
where
    C: ConnectionTrait,
{
    let Some(user) = find_by_email(db, email).await? else {
        debug!("login for unknown email");
        return Ok(None);
    };
    if verify_password(password.to_string(), user.password_hash.clone()).await? {
        Ok(Some(user))
    } else {
        debug!(user_id = user.id, "login with wrong password");
        Ok(None)
    }
}

/// Applies a profile change. The email is the login identity and cannot change.
pub async fn update_profile<C>(
    db: &C,
    user: user::Model,
    update: ProfileUpdate,
) -> AppResult<user::Model>
where
    C: ConnectionTrait,
{
    let mut errors = ValidationErrors::new();

    let username = update.username.as_deref().map(normalize_username);
    if let Some(username) = &username {
        check_username(&mut errors, username);
        if errors.is_empty() && username_taken(db, username, Some(user.id)).await? {
            errors.add("username", "unique", USERNAME_TAKEN);
        }
    }
    if let Some(password) = &update.password {
        check_password(&mut errors, password);
    }
    errors.into_result()?;

    let user_id = user.id;
    let mut active: user::ActiveModel = user.into();
    if let Some(username) = username {
        active.username = Set(username);
    }
    if let Some(password) = update.password {
        active.password_hash = Set(hash_password(password).await?);
    }
    let user = active.update(db).await.map_err(user_taken)?;

    info!(user_id, "profile updated");
    Ok(user)
}

/// Records an uploaded avatar file name under `avatars/{user_id}/`.
pub async fn set_avatar<C>(db: &C, user_id: i32, filename: &str) -> AppResult<user::Model>
where
    C: ConnectionTrait,
{
    let current =
        user::Entity::find_by_id(user_id).one(db).await?.ok_or(AppError::NotFound("User"))?;
    let mut active: user::ActiveModel = current.into();
    active.avatar = Set(Some(media::path(media::AVATARS, user_id, filename)));
    Ok(active.update(db).await?)
}
