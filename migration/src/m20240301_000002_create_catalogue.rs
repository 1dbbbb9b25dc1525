use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Film::Table)
                    .if_not_exists()
                    .col(uuid(Film::Id).primary_key())
                    .col(string_len(Film::Title, 150))
                    .col(integer(Film::Year).default(2000))
                    .col(text_null(Film::ReviewShort))
                    .col(text_null(Film::ReviewLarge))
                    .col(string_len_null(Film::TrailerUrl, 150))
                    .col(string_null(Film::ImageThumbnail))
                    .col(string_null(Film::ImageWallpaper))
                    .col(integer(Film::Favorites).default(0))
                    .col(double(Film::AverageNote).default(0.0))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_title")
                    .table(Film::Table)
                    .col(Film::Title)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genre::Table)
                    .if_not_exists()
                    .col(pk_auto(Genre::Id))
                    .col(string_len(Genre::Name, 50).unique_key())
                    .col(string_len(Genre::Slug, 50).unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FilmGenre::Table)
                    .if_not_exists()
                    .col(uuid(FilmGenre::FilmId))
                    .col(integer(FilmGenre::GenreId))
                    .primary_key(Index::create().col(FilmGenre::FilmId).col(FilmGenre::GenreId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_genre_film")
                            .from(FilmGenre::Table, FilmGenre::FilmId)
                            .to(Film::Table, Film::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_film_genre_genre")
                            .from(FilmGenre::Table, FilmGenre::GenreId)
                            .to(Genre::Table, Genre::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_genre_genre_id")
                    .table(FilmGenre::Table)
                    .col(FilmGenre::GenreId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(FilmGenre::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Genre::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Film::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Film {
    Table,
    Id,
    Title,
    Year,
    ReviewShort,
    ReviewLarge,
    TrailerUrl,
    ImageThumbnail,
    ImageWallpaper,
    Favorites,
    AverageNote,
}

#[derive(DeriveIden)]
enum Genre {
    Table,
    Id,
    Name,
    Slug,
}

#[derive(DeriveIden)]
enum FilmGenre {
    Table,
    FilmId,
    GenreId,
}
