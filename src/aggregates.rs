//! Film-level statistics derived from relationship rows.
//!
//! `recompute` must run on the same connection (transaction) as the write that
//! changed the relationship rows, before it commits.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, sea_query::Expr};
use tracing::debug;
use uuid::Uuid;

use crate::{
    entities::{film, user_film},
    error::AppResult,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilmAggregates {
    pub favorites: i32,
    pub average_note: f64,
}

/// Folds `(favorite, note)` pairs into the film statistics. Rows without a note
/// do not count towards the average; with no notes at all it stays at 0.0.
pub fn compute<I>(rows: I) -> FilmAggregates
where
    I: IntoIterator<Item = (bool, Option<i16>)>,
{
    let mut favorites = 0;
    let mut note_sum = 0i64;
    let mut note_count = 0i64;

    for (favorite, note) in rows {
        if favorite {
            favorites += 1;
        }
        if let Some(note) = note {
            note_sum += i64::from(note);
            note_count += 1;
        }
    }

    let average_note =
        if note_count > 0 { round2(note_sum as f64 / note_count as f64) } else { 0.0 };

    FilmAggregates { favorites, average_note }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub async fn recompute<C>(db: &C, film_id: Uuid) -> AppResult<FilmAggregates>
where
    C: ConnectionTrait,
{
    let rows: Vec<(bool, Option<i16>)> = user_film::Entity::find()
        .select_only()
        .column(user_film::Column::Favorite)
        .column(user_film::Column::Note)
        .filter(user_film::Column::FilmId.eq(film_id))
        .into_tuple()
        .all(db)
        .await?;

    let aggregates = compute(rows);

    film::Entity::update_many()
        .col_expr(film::Column::Favorites, Expr::value(aggregates.favorites))
        .col_expr(film::Column::AverageNote, Expr::value(aggregates.average_note))
        .filter(film::Column::Id.eq(film_id))
        .exec(db)
        .await?;

    debug!(
        film_id = %film_id,
        favorites = aggregates.favorites,
        average_note = aggregates.average_note,
        "recomputed film aggregates"
    );

    Ok(aggregates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{insert_user_film, seed_film, seed_user, setup_test_db};

    #[test]
    fn mixed_rows_match_worked_example() {
        let stats = compute([(true, Some(8)), (false, Some(6)), (true, None)]);
        assert_eq!(stats, FilmAggregates { favorites: 2, average_note: 7.0 });
    }

    #[test]
    fn no_notes_leaves_average_at_zero() {
        let stats = compute([(true, None), (false, None)]);
        assert_eq!(stats, FilmAggregates { favorites: 1, average_note: 0.0 });
        assert_eq!(compute(Vec::new()), FilmAggregates { favorites: 0, average_note: 0.0 });
    }

    #[test]
    fn average_is_rounded_to_two_decimals() {
        let stats = compute([(false, Some(7)), (false, Some(8)), (false, Some(8))]);
        assert_eq!(stats.average_note, 7.67);
        let stats = compute([(false, Some(1)), (false, Some(0)), (false, Some(0))]);
        assert_eq!(stats.average_note, 0.33);
    }

    #[tokio::test]
    async fn recompute_persists_to_film_row() {
        let db = setup_test_db().await;
        let film = seed_film(&db, "Heat", 1995, &[]).await;
        let alice = seed_user(&db, "alice@example.com", "alice").await;
        let bob = seed_user(&db, "bob@example.com", "bob").await;
        let carol = seed_user(&db, "carol@example.com", "carol").await;

        insert_user_film(&db, film.id, alice.id, true, Some(8)).await;
        insert_user_film(&db, film.id, bob.id, false, Some(6)).await;
        insert_user_film(&db, film.id, carol.id, true, None).await;

        let stats = recompute(&db, film.id).await.unwrap();
        assert_eq!(stats, FilmAggregates { favorites: 2, average_note: 7.0 });

        let stored = film::Entity::find_by_id(film.id).one(&db).await.unwrap().unwrap();
        assert_eq!(stored.favorites, 2);
        assert_eq!(stored.average_note, 7.0);
    }

    #[tokio::test]
    async fn recompute_without_rows_resets_stats() {
        let db = setup_test_db().await;
        let film = seed_film(&db, "Alien", 1979, &[]).await;

        let stats = recompute(&db, film.id).await.unwrap();
        assert_eq!(stats, FilmAggregates { favorites: 0, average_note: 0.0 });
    }
}
