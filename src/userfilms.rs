use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use tracing::info;

use crate::{
    aggregates,
    catalogue,
    entities::{film, user_film},
    error::{AppError, AppResult},
    models::{FilmState, UpsertOutcome, UpsertUserFilm, UserFilmView},
};

/// The caller's relationship rows, ordered by film title, each with its film.
pub async fn list_for_user<C>(db: &C, user_id: i32) -> AppResult<Vec<UserFilmView>>
where
    C: ConnectionTrait,
{
    let rows = user_film::Entity::find()
        .filter(user_film::Column::UserId.eq(user_id))
        .find_also_related(film::Entity)
        .order_by_asc(film::Column::Title)
        .order_by_asc(user_film::Column::Id)
        .all(db)
        .await?;

    let (rows, films): (Vec<_>, Vec<_>) =
        rows.into_iter().filter_map(|(row, film)| film.map(|film| (row, film))).unzip();
    let films = catalogue::with_genres(db, films).await?;

    Ok(rows.into_iter().zip(films).map(|(row, film)| UserFilmView { row, film }).collect())
}

/// Creates, updates or removes the caller's row for a film and refreshes the
/// film's aggregates, all in one transaction. A row whose state becomes unset
/// is deleted instead of saved.
pub async fn upsert(
    db: &DatabaseConnection,
    user_id: i32,
    cmd: UpsertUserFilm,
) -> AppResult<UpsertOutcome> {
    let txn = db.begin().await?;

    let film = film::Entity::find_by_id(cmd.film_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound("Film"))?;

    let existing = user_film::Entity::find()
        .filter(user_film::Column::FilmId.eq(film.id))
        .filter(user_film::Column::UserId.eq(user_id))
        .one(&txn)
        .await?;

    let outcome = if cmd.state == FilmState::Unset {
        if let Some(row) = existing {
            row.delete(&txn).await?;
        }
        UpsertOutcome::Deleted
    } else {
        let mut active = match existing {
            Some(row) => row.into(),
            None => user_film::ActiveModel {
                film_id: Set(film.id),
                user_id: Set(user_id),
                ..Default::default()
            },
        };
        active.state = Set(cmd.state.as_code());
        active.favorite = Set(cmd.favorite);
        active.note = Set(cmd.note);
        active.review = Set(cmd.review);
        active.save(&txn).await?;
        UpsertOutcome::Saved
    };

    let stats = aggregates::recompute(&txn, film.id).await?;
    txn.commit().await?;

    info!(
        film_id = %film.id,
        user_id,
        outcome = ?outcome,
        favorites = stats.favorites,
        average_note = stats.average_note,
        "user film updated"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use sea_orm::PaginatorTrait;
    use uuid::Uuid;

    use super::*;
    use crate::test_utils::{seed_film, seed_user, setup_test_db};

    fn cmd(film_id: Uuid, state: FilmState, favorite: bool, note: Option<i16>) -> UpsertUserFilm {
        UpsertUserFilm { film_id, state, favorite, note, review: None }
    }

    async fn rows_for(db: &DatabaseConnection, film_id: Uuid, user_id: i32) -> u64 {
        user_film::Entity::find()
            .filter(user_film::Column::FilmId.eq(film_id))
            .filter(user_film::Column::UserId.eq(user_id))
            .count(db)
            .await
            .unwrap()
    }

    async fn stats(db: &DatabaseConnection, film_id: Uuid) -> (i32, f64) {
        let film = film::Entity::find_by_id(film_id).one(db).await.unwrap().unwrap();
        (film.favorites, film.average_note)
    }

    #[tokio::test]
    async fn creates_then_updates_in_place() {
        let db = setup_test_db().await;
        let film = seed_film(&db, "Heat", 1995, &[]).await;
        let user = seed_user(&db, "ana@example.com", "ana").await;

        let outcome =
            upsert(&db, user.id, cmd(film.id, FilmState::Watched, true, Some(9))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Saved);
        assert_eq!(rows_for(&db, film.id, user.id).await, 1);

        let mut update = cmd(film.id, FilmState::WantToWatch, false, Some(4));
        update.review = Some("rewatch".into());
        upsert(&db, user.id, update).await.unwrap();
        assert_eq!(rows_for(&db, film.id, user.id).await, 1);

        let rows = list_for_user(&db, user.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row.state, FilmState::WantToWatch.as_code());
        assert_eq!(rows[0].row.note, Some(4));
        assert_eq!(rows[0].row.review.as_deref(), Some("rewatch"));
        assert!(!rows[0].row.favorite);
        assert_eq!(stats(&db, film.id).await, (0, 4.0));
    }

    #[tokio::test]
    async fn unset_state_deletes_row() {
        let db = setup_test_db().await;
        let film = seed_film(&db, "Heat", 1995, &[]).await;
        let user = seed_user(&db, "ana@example.com", "ana").await;

        upsert(&db, user.id, cmd(film.id, FilmState::Watched, true, Some(7))).await.unwrap();
        let outcome =
            upsert(&db, user.id, cmd(film.id, FilmState::Unset, true, Some(7))).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Deleted);
        assert_eq!(rows_for(&db, film.id, user.id).await, 0);
        assert_eq!(stats(&db, film.id).await, (0, 0.0));
    }

    #[tokio::test]
    async fn unset_without_prior_row_reports_deleted() {
        let db = setup_test_db().await;
        let film = seed_film(&db, "Heat", 1995, &[]).await;
        let user = seed_user(&db, "ana@example.com", "ana").await;

        let outcome =
            upsert(&db, user.id, cmd(film.id, FilmState::Unset, false, None)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Deleted);
        assert_eq!(rows_for(&db, film.id, user.id).await, 0);
    }

    #[tokio::test]
    async fn unknown_film_creates_nothing() {
        let db = setup_test_db().await;
        let user = seed_user(&db, "ana@example.com", "ana").await;

        let err = upsert(&db, user.id, cmd(Uuid::new_v4(), FilmState::Watched, true, Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("Film")));
        assert_eq!(user_film::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn aggregates_track_every_step() {
        let db = setup_test_db().await;
        let film = seed_film(&db, "Heat", 1995, &[]).await;
        let ana = seed_user(&db, "ana@example.com", "ana").await;
        let bob = seed_user(&db, "bob@example.com", "bob").await;
        let eve = seed_user(&db, "eve@example.com", "eve").await;

        upsert(&db, ana.id, cmd(film.id, FilmState::Watched, true, Some(8))).await.unwrap();
        assert_eq!(stats(&db, film.id).await, (1, 8.0));

        upsert(&db, bob.id, cmd(film.id, FilmState::Watched, false, Some(6))).await.unwrap();
        assert_eq!(stats(&db, film.id).await, (1, 7.0));

        upsert(&db, eve.id, cmd(film.id, FilmState::WantToWatch, true, None)).await.unwrap();
        assert_eq!(stats(&db, film.id).await, (2, 7.0));

        upsert(&db, bob.id, cmd(film.id, FilmState::Watched, false, Some(9))).await.unwrap();
        assert_eq!(stats(&db, film.id).await, (2, 8.5));

        upsert(&db, ana.id, cmd(film.id, FilmState::Unset, false, None)).await.unwrap();
        assert_eq!(stats(&db, film.id).await, (1, 9.0));

        upsert(&db, bob.id, cmd(film.id, FilmState::Watched, false, None)).await.unwrap();
        assert_eq!(stats(&db, film.id).await, (1, 0.0));
    }

    #[tokio::test]
    async fn lists_only_own_rows_by_title() {
        let db = setup_test_db().await;
        let zodiac = seed_film(&db, "Zodiac", 2007, &[]).await;
        let alien = seed_film(&db, "Alien", 1979, &[]).await;
        let ana = seed_user(&db, "ana@example.com", "ana").await;
        let bob = seed_user(&db, "bob@example.com", "bob").await;

        upsert(&db, ana.id, cmd(zodiac.id, FilmState::Watched, false, None)).await.unwrap();
        upsert(&db, ana.id, cmd(alien.id, FilmState::WantToWatch, false, None)).await.unwrap();
        upsert(&db, bob.id, cmd(alien.id, FilmState::Watched, true, Some(10))).await.unwrap();

        let titles: Vec<String> = list_for_user(&db, ana.id)
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.film.film.title)
            .collect();
        assert_eq!(titles, vec!["Alien", "Zodiac"]);
        assert_eq!(list_for_user(&db, bob.id).await.unwrap().len(), 1);
    }
}
