//! Shared test fixtures: an in-memory database with migrations applied and
//! small seeding helpers for films, genres, users and relationship rows.

use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use crate::{
    catalogue, db,
    entities::{film, genre, user, user_film},
};

pub(crate) async fn setup_test_db() -> DatabaseConnection {
    db::connect_and_migrate("sqlite::memory:").await.unwrap()
}

pub(crate) async fn seed_genre(db: &DatabaseConnection, name: &str) -> genre::Model {
    catalogue::create_genre(db, name).await.unwrap()
}

pub(crate) async fn seed_film(
    db: &DatabaseConnection,
    title: &str,
    year: i32,
    genres: &[i32],
) -> film::Model {
    let new = catalogue::NewFilm {
        title: title.to_string(),
        year: Some(year),
        genres: genres.to_vec(),
        ..Default::default()
    };
    catalogue::create_film(db, new).await.unwrap().film
}

/// Inserts a user directly; the password hash is a placeholder that never verifies.
pub(crate) async fn seed_user(db: &DatabaseConnection, email: &str, username: &str) -> user::Model {
    user::ActiveModel {
        id: Default::default(),
        email: Set(email.to_string()),
        username: Set(username.to_string()),
        password_hash: Set("!".to_string()),
        avatar: Set(None),
        date_joined: Set(0),
    }
    .insert(db)
    .await
    .unwrap()
}

/// Writes a relationship row without touching film aggregates.
pub(crate) async fn insert_user_film(
    db: &DatabaseConnection,
    film_id: Uuid,
    user_id: i32,
    favorite: bool,
    note: Option<i16>,
) {
    let row = user_film::ActiveModel {
        id: Default::default(),
        film_id: Set(film_id),
        user_id: Set(user_id),
        state: Set(1),
        favorite: Set(favorite),
        note: Set(note),
        review: Set(None),
    };
    user_film::Entity::insert(row).exec(db).await.unwrap();
}
