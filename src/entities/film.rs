use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "film")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub year: i32,
    pub review_short: Option<String>,
    pub review_large: Option<String>,
    pub trailer_url: Option<String>,
    pub image_thumbnail: Option<String>,
    pub image_wallpaper: Option<String>,
    /// Number of users who marked the film as favorite. Derived, see `aggregates`.
    pub favorites: i32,
    /// Mean of all non-null notes, rounded to 2 decimals. Derived, see `aggregates`.
    pub average_note: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::film_genre::Entity")]
    FilmGenre,
    #[sea_orm(has_many = "super::user_film::Entity")]
    UserFilm,
}

impl Related<super::film_genre::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FilmGenre.def()
    }
}

impl Related<super::user_film::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserFilm.def()
    }
}

impl Related<super::genre::Entity> for Entity {
    fn to() -> RelationDef {
        super::film_genre::Relation::Genre.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::film_genre::Relation::Film.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
