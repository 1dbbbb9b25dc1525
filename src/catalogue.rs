use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Select, Set, TransactionTrait,
    sea_query::{Expr, LikeExpr, Order, Query},
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    entities::{film, film_genre, genre},
    error::{AppError, AppResult, ValidationErrors, unique_violation},
    media,
    models::{FilmView, GenreView, Page},
};

pub const PAGE_SIZE: u64 = 8;

const LIKE_ESCAPE: char = '!';

const GENRE_TAKEN: &str = "A genre with this name already exists.";

const GENRE_NAME_SORT_KEY: &str = "(SELECT MIN(g.name) FROM film_genre fg \
     JOIN genre g ON g.id = fg.genre_id WHERE fg.film_id = film.id)";

/// Raw query string of `GET /films/`. Values are kept as text so that bad
/// input turns into field errors instead of an extractor rejection.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilmQuery {
    #[serde(rename = "year__gte")]
    pub year_gte: Option<String>,
    #[serde(rename = "year__lte")]
    pub year_lte: Option<String>,
    pub genres: Option<String>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortKey {
    Title,
    Year,
    Genre,
    Favorites,
    AverageNote,
}

impl SortKey {
    fn from_param(name: &str) -> Option<Self> {
        match name {
            "title" => Some(SortKey::Title),
            "year" => Some(SortKey::Year),
            "genres" | "genres__name" => Some(SortKey::Genre),
            "favorites" => Some(SortKey::Favorites),
            "average_note" => Some(SortKey::AverageNote),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilmFilter {
    pub year_gte: Option<i32>,
    pub year_lte: Option<i32>,
    pub genre: Option<i32>,
    pub terms: Vec<String>,
    pub ordering: Vec<(SortKey, Order)>,
}

impl FilmQuery {
    pub fn filter(&self) -> AppResult<FilmFilter> {
        let mut errors = ValidationErrors::new();

        let mut number = |field: &'static str, raw: &Option<String>| -> Option<i32> {
            let raw = raw.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
            match raw.parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    errors.add(field, "invalid", "Enter a number.");
                    None
                },
            }
        };

        let year_gte = number("year__gte", &self.year_gte);
        let year_lte = number("year__lte", &self.year_lte);
        let genre = number("genres", &self.genres);
        errors.into_result()?;

        let terms = self
            .search
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let ordering = self
            .ordering
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter_map(|field| match field.strip_prefix('-') {
                Some(name) => SortKey::from_param(name).map(|k| (k, Order::Desc)),
                None => SortKey::from_param(field).map(|k| (k, Order::Asc)),
            })
            .collect();

        Ok(FilmFilter { year_gte, year_lte, genre, terms, ordering })
    }

    pub fn page_number(&self) -> AppResult<u64> {
        match self.page.as_deref().map(str::trim) {
            None | Some("") => Ok(1),
            Some("last") => Ok(u64::MAX),
            Some(raw) => raw.parse().ok().filter(|n| *n >= 1).ok_or(AppError::InvalidPage),
        }
    }

    /// Relative continuation token for `page`, carrying the other active params.
    pub fn link(&self, page: u64) -> String {
        let mut link = format!("?page={page}");
        let params = [
            ("year__gte", &self.year_gte),
            ("year__lte", &self.year_lte),
            ("genres", &self.genres),
            ("search", &self.search),
            ("ordering", &self.ordering),
        ];
        for (name, value) in params {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                link.push('&');
                link.push_str(name);
                link.push('=');
                link.push_str(&urlencoding::encode(value));
            }
        }
        link
    }
}

fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Every term has to appear in the title, the year or one of the genre names.
fn search_condition(term: &str) -> Condition {
    let pattern = like_pattern(term);

    let in_genre = Query::select()
        .column((film_genre::Entity, film_genre::Column::FilmId))
        .from(film_genre::Entity)
        .inner_join(
            genre::Entity,
            Expr::col((genre::Entity, genre::Column::Id))
                .equals((film_genre::Entity, film_genre::Column::GenreId)),
        )
        .and_where(
            Expr::col((genre::Entity, genre::Column::Name))
                .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
        )
        .to_owned();

    Condition::any()
        .add(
            Expr::col((film::Entity, film::Column::Title))
                .like(LikeExpr::new(pattern.clone()).escape(LIKE_ESCAPE)),
        )
        .add(Expr::cust_with_values("CAST(film.year AS TEXT) LIKE ? ESCAPE '!'", [pattern]))
        .add(film::Column::Id.in_subquery(in_genre))
}

fn films_query(filter: &FilmFilter) -> Select<film::Entity> {
    let mut query = film::Entity::find();

    if let Some(year) = filter.year_gte {
        query = query.filter(film::Column::Year.gte(year));
    }
    if let Some(year) = filter.year_lte {
        query = query.filter(film::Column::Year.lte(year));
    }
    if let Some(genre_id) = filter.genre {
        query = query.filter(
            film::Column::Id.in_subquery(
                Query::select()
                    .column(film_genre::Column::FilmId)
                    .from(film_genre::Entity)
                    .and_where(film_genre::Column::GenreId.eq(genre_id))
                    .to_owned(),
            ),
        );
    }
    for term in &filter.terms {
        query = query.filter(search_condition(term));
    }

    if filter.ordering.is_empty() {
        query = query.order_by_asc(film::Column::Title);
    }
    for (key, order) in &filter.ordering {
        query = match key {
            SortKey::Title => query.order_by(film::Column::Title, order.clone()),
            SortKey::Year => query.order_by(film::Column::Year, order.clone()),
            SortKey::Genre => query.order_by(Expr::cust(GENRE_NAME_SORT_KEY), order.clone()),
            SortKey::Favorites => query.order_by(film::Column::Favorites, order.clone()),
            SortKey::AverageNote => query.order_by(film::Column::AverageNote, order.clone()),
        };
    }

    // stable pages when the requested ordering has ties
    query.order_by_asc(film::Column::Id)
}

pub async fn list_films<C>(db: &C, query: &FilmQuery) -> AppResult<Page<FilmView>>
where
    C: ConnectionTrait,
{
    let filter = query.filter()?;
    let requested = query.page_number()?;

    let paginator = films_query(&filter).paginate(db, PAGE_SIZE);
    let totals = paginator.num_items_and_pages().await?;
    let num_pages = totals.number_of_pages.max(1);

    let page_number = if requested == u64::MAX { num_pages } else { requested };
    if page_number > num_pages {
        return Err(AppError::InvalidPage);
    }

    let films = paginator.fetch_page(page_number - 1).await?;
    debug!(
        count = totals.number_of_items,
        page = page_number,
        returned = films.len(),
        "listed films"
    );
    let results = with_genres(db, films).await?;

    Ok(Page {
        count: totals.number_of_items,
        num_pages,
        page_number,
        page_size: PAGE_SIZE,
        next_link: (page_number < num_pages).then(|| query.link(page_number + 1)),
        previous_link: (page_number > 1).then(|| query.link(page_number - 1)),
        results,
    })
}

pub async fn get_film<C>(db: &C, id: Uuid) -> AppResult<FilmView>
where
    C: ConnectionTrait,
{
    let film = film::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("Film"))?;
    let mut views = with_genres(db, vec![film]).await?;
    views.pop().ok_or_else(|| anyhow::anyhow!("film {id} vanished while loading genres").into())
}

/// Attaches each film's genres, sorted by name, preserving the order of `films`.
pub async fn with_genres<C>(db: &C, films: Vec<film::Model>) -> AppResult<Vec<FilmView>>
where
    C: ConnectionTrait,
{
    let ids: Vec<Uuid> = films.iter().map(|f| f.id).collect();
    let links = film_genre::Entity::find()
        .filter(film_genre::Column::FilmId.is_in(ids))
        .find_also_related(genre::Entity)
        .all(db)
        .await?;

    let mut by_film: HashMap<Uuid, Vec<genre::Model>> = HashMap::new();
    for (link, genre) in links {
        if let Some(genre) = genre {
            by_film.entry(link.film_id).or_default().push(genre);
        }
    }

    Ok(films
        .into_iter()
        .map(|film| {
            let mut genres = by_film.remove(&film.id).unwrap_or_default();
            genres.sort_by(|a, b| a.name.cmp(&b.name));
            FilmView { film, genres }
        })
        .collect())
}

pub async fn list_genres<C>(db: &C) -> AppResult<Vec<GenreView>>
where
    C: ConnectionTrait,
{
    let genres = genre::Entity::find().order_by_asc(genre::Column::Name).all(db).await?;
    with_films(db, genres).await
}

pub async fn get_genre<C>(db: &C, slug: &str) -> AppResult<GenreView>
where
    C: ConnectionTrait,
{
    let genre = genre::Entity::find()
        .filter(genre::Column::Slug.eq(slug))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("Genre"))?;
    let mut views = with_films(db, vec![genre]).await?;
    views.pop().ok_or_else(|| anyhow::anyhow!("genre {slug} vanished while loading films").into())
}

async fn with_films<C>(db: &C, genres: Vec<genre::Model>) -> AppResult<Vec<GenreView>>
where
    C: ConnectionTrait,
{
    let ids: Vec<i32> = genres.iter().map(|g| g.id).collect();
    let links = film_genre::Entity::find()
        .filter(film_genre::Column::GenreId.is_in(ids))
        .find_also_related(film::Entity)
        .all(db)
        .await?;

    let mut by_genre: HashMap<i32, Vec<film::Model>> = HashMap::new();
    for (link, film) in links {
        if let Some(film) = film {
            by_genre.entry(link.genre_id).or_default().push(film);
        }
    }

    Ok(genres
        .into_iter()
        .map(|genre| {
            let mut films = by_genre.remove(&genre.id).unwrap_or_default();
            films.sort_by(|a, b| a.title.cmp(&b.title));
            GenreView { genre, films }
        })
        .collect())
}

/// URL-safe form of a genre name: accents folded to ASCII, anything that is not
/// a letter, digit, underscore or hyphen dropped, runs of spaces and hyphens
/// collapsed to a single hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_whitespace() || c == '-' {
            pending_dash = true;
        } else if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }

    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

fn validate_genre_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    let mut errors = ValidationErrors::new();
    if name.is_empty() {
        errors.add("name", "required", "This field may not be blank.");
    } else if name.chars().count() > 50 {
        errors.add("name", "max_length", "Ensure this field has no more than 50 characters.");
    } else if slugify(name).is_empty() {
        errors.add("name", "invalid", "Name must contain at least one letter or digit.");
    }
    errors.into_result()?;
    Ok(name.to_string())
}

async fn ensure_genre_unique<C>(
    db: &C,
    name: &str,
    slug: &str,
    except: Option<i32>,
) -> AppResult<()>
where
    C: ConnectionTrait,
{
    let mut clash = genre::Entity::find().filter(
        Condition::any().add(genre::Column::Name.eq(name)).add(genre::Column::Slug.eq(slug)),
    );
    if let Some(id) = except {
        clash = clash.filter(genre::Column::Id.ne(id));
    }
    if clash.one(db).await?.is_some() {
        return Err(ValidationErrors::single("name", "unique", GENRE_TAKEN).into());
    }
    Ok(())
}

/// Name and slug clashes both surface on `name`; the slug is derived from it.
fn genre_taken(err: DbErr) -> AppError {
    unique_violation(err, |_| ("name", GENRE_TAKEN))
}

pub async fn create_genre<C>(db: &C, name: &str) -> AppResult<genre::Model>
where
    C: ConnectionTrait,
{
    let name = validate_genre_name(name)?;
    let slug = slugify(&name);
    ensure_genre_unique(db, &name, &slug, None).await?;

    let genre = genre::ActiveModel { id: Default::default(), name: Set(name), slug: Set(slug) }
        .insert(db)
        .await
        .map_err(genre_taken)?;
    info!(genre_id = genre.id, slug = %genre.slug, "created genre");
    Ok(genre)
}

/// Renames a genre; the slug always follows the new name.
pub async fn rename_genre<C>(db: &C, id: i32, name: &str) -> AppResult<genre::Model>
where
    C: ConnectionTrait,
{
    let name = validate_genre_name(name)?;
    let slug = slugify(&name);
    let current =
        genre::Entity::find_by_id(id).one(db).await?.ok_or(AppError::NotFound("Genre"))?;
    ensure_genre_unique(db, &name, &slug, Some(id)).await?;

    let mut active: genre::ActiveModel = current.into();
    active.name = Set(name);
    active.slug = Set(slug);
    let genre = active.update(db).await.map_err(genre_taken)?;
    info!(genre_id = genre.id, slug = %genre.slug, "renamed genre");
    Ok(genre)
}

#[derive(Clone, Debug, Default)]
pub struct NewFilm {
    pub title: String,
    pub year: Option<i32>,
    pub review_short: Option<String>,
    pub review_large: Option<String>,
    pub trailer_url: Option<String>,
    /// Uploaded file names; stored under `films/{id}/`.
    pub image_thumbnail: Option<String>,
    pub image_wallpaper: Option<String>,
    pub genres: Vec<i32>,
}

pub async fn create_film<C>(db: &C, new: NewFilm) -> AppResult<FilmView>
where
    C: ConnectionTrait + TransactionTrait,
{
    let title = new.title.trim().to_string();
    let mut errors = ValidationErrors::new();
    if title.is_empty() {
        errors.add("title", "required", "This field may not be blank.");
    } else if title.chars().count() > 150 {
        errors.add("title", "max_length", "Ensure this field has no more than 150 characters.");
    }
    if new.year.is_some_and(|y| y < 0) {
        errors.add("year", "min_value", "Ensure this value is greater than or equal to 0.");
    }
    if new.trailer_url.as_deref().is_some_and(|u| u.chars().count() > 150) {
        errors.add(
            "trailer_url",
            "max_length",
            "Ensure this field has no more than 150 characters.",
        );
    }
    errors.into_result()?;

    let id = Uuid::new_v4();
    let txn = db.begin().await?;

    let film = film::ActiveModel {
        id: Set(id),
        title: Set(title),
        year: Set(new.year.unwrap_or(2000)),
        review_short: Set(new.review_short),
        review_large: Set(new.review_large),
        trailer_url: Set(new.trailer_url),
        image_thumbnail: Set(new.image_thumbnail.map(|f| media::path(media::FILMS, id, &f))),
        image_wallpaper: Set(new.image_wallpaper.map(|f| media::path(media::FILMS, id, &f))),
        favorites: Set(0),
        average_note: Set(0.0),
    }
    .insert(&txn)
    .await?;

    replace_genres(&txn, id, &new.genres).await?;
    let view = with_genres(&txn, vec![film]).await?.pop();
    txn.commit().await?;

    let view = view.ok_or_else(|| anyhow::anyhow!("film {id} missing after insert"))?;
    info!(film_id = %id, title = %view.film.title, "created film");
    Ok(view)
}

pub async fn set_film_genres<C>(db: &C, film_id: Uuid, genres: &[i32]) -> AppResult<FilmView>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    let film =
        film::Entity::find_by_id(film_id).one(&txn).await?.ok_or(AppError::NotFound("Film"))?;
    replace_genres(&txn, film_id, genres).await?;
    let view = with_genres(&txn, vec![film]).await?.pop();
    txn.commit().await?;
    Ok(view.ok_or_else(|| anyhow::anyhow!("film {film_id} missing after genre update"))?)
}

async fn replace_genres<C>(db: &C, film_id: Uuid, genres: &[i32]) -> AppResult<()>
where
    C: ConnectionTrait,
{
    let mut wanted = genres.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    let known =
        genre::Entity::find().filter(genre::Column::Id.is_in(wanted.clone())).count(db).await?;
    if known != wanted.len() as u64 {
        return Err(
            ValidationErrors::single("genres", "does_not_exist", "Invalid genre id.").into()
        );
    }

    film_genre::Entity::delete_many()
        .filter(film_genre::Column::FilmId.eq(film_id))
        .exec(db)
        .await?;

    if !wanted.is_empty() {
        let links = wanted.into_iter().map(|genre_id| film_genre::ActiveModel {
            film_id: Set(film_id),
            genre_id: Set(genre_id),
        });
        film_genre::Entity::insert_many(links).exec_without_returning(db).await?;
    }
    Ok(())
}
