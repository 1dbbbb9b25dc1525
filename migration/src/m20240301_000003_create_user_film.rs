use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserFilm::Table)
                    .if_not_exists()
                    .col(pk_auto(UserFilm::Id))
                    .col(uuid(UserFilm::FilmId))
                    .col(integer(UserFilm::UserId))
                    .col(small_integer(UserFilm::State).default(0))
                    .col(boolean(UserFilm::Favorite).default(false))
                    .col(small_integer_null(UserFilm::Note))
                    .col(text_null(UserFilm::Review))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_film_film")
                            .from(UserFilm::Table, UserFilm::FilmId)
                            .to(Film::Table, Film::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_film_user")
                            .from(UserFilm::Table, UserFilm::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_film_unique")
                    .table(UserFilm::Table)
                    .col(UserFilm::FilmId)
                    .col(UserFilm::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_film_user_id")
                    .table(UserFilm::Table)
                    .col(UserFilm::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(UserFilm::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum UserFilm {
    Table,
    Id,
    FilmId,
    UserId,
    State,
    Favorite,
    Note,
    Review,
}

#[derive(DeriveIden)]
enum Film {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,
}
