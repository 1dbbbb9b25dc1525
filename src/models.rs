use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    entities::{film, genre, user, user_film},
    error::{AppError, AppResult, ValidationErrors},
    media,
};

pub const MAX_NOTE: i64 = 10;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilmState {
    Unset,
    Watched,
    WantToWatch,
}

impl FilmState {
    pub fn as_code(self) -> i16 {
        match self {
            FilmState::Unset => 0,
            FilmState::Watched => 1,
            FilmState::WantToWatch => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(FilmState::Unset),
            1 => Some(FilmState::Watched),
            2 => Some(FilmState::WantToWatch),
            _ => None,
        }
    }
}

/// A film together with its genres, as loaded by the catalogue.
#[derive(Clone, Debug)]
pub struct FilmView {
    pub film: film::Model,
    pub genres: Vec<genre::Model>,
}

#[derive(Clone, Debug)]
pub struct GenreView {
    pub genre: genre::Model,
    pub films: Vec<film::Model>,
}

#[derive(Clone, Debug)]
pub struct UserFilmView {
    pub row: user_film::Model,
    pub film: FilmView,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreSummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
}

impl From<genre::Model> for GenreSummary {
    fn from(genre: genre::Model) -> Self {
        Self { id: genre.id, name: genre.name, slug: genre.slug }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilmResponse {
    pub id: Uuid,
    pub title: String,
    pub year: i32,
    pub review_short: Option<String>,
    pub review_large: Option<String>,
    pub trailer_url: Option<String>,
    pub genres: Vec<GenreSummary>,
    pub image_thumbnail: Option<String>,
    pub image_wallpaper: Option<String>,
    pub favorites: i32,
    pub average_note: f64,
}

impl FilmResponse {
    pub fn new(view: FilmView, media_url: &str) -> Self {
        let FilmView { film, genres } = view;
        Self {
            id: film.id,
            title: film.title,
            year: film.year,
            review_short: film.review_short,
            review_large: film.review_large,
            trailer_url: film.trailer_url,
            genres: genres.into_iter().map(GenreSummary::from).collect(),
            image_thumbnail: film.image_thumbnail.map(|p| media::url(media_url, &p)),
            image_wallpaper: film.image_wallpaper.map(|p| media::url(media_url, &p)),
            favorites: film.favorites,
            average_note: film.average_note,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilmSummary {
    pub id: Uuid,
    pub title: String,
    pub image_thumbnail: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenreResponse {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub films: Vec<FilmSummary>,
}

impl GenreResponse {
    pub fn new(view: GenreView, media_url: &str) -> Self {
        let GenreView { genre, films } = view;
        Self {
            id: genre.id,
            name: genre.name,
            slug: genre.slug,
            films: films
                .into_iter()
                .map(|f| FilmSummary {
                    id: f.id,
                    title: f.title,
                    image_thumbnail: f.image_thumbnail.map(|p| media::url(media_url, &p)),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub num_pages: u64,
    pub page_number: u64,
    pub page_size: u64,
    pub next_link: Option<String>,
    pub previous_link: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            num_pages: self.num_pages,
            page_number: self.page_number,
            page_size: self.page_size,
            next_link: self.next_link,
            previous_link: self.previous_link,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserFilmResponse {
    pub id: i32,
    pub film: FilmResponse,
    pub state: i16,
    pub favorite: bool,
    pub note: Option<i16>,
    pub review: Option<String>,
}

impl UserFilmResponse {
    pub fn new(view: UserFilmView, media_url: &str) -> Self {
        let UserFilmView { row, film } = view;
        Self {
            id: row.id,
            film: FilmResponse::new(film, media_url),
            state: row.state,
            favorite: row.favorite,
            note: row.note,
            review: row.review,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum UpsertOutcome {
    Saved,
    Deleted,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl From<UpsertOutcome> for StatusResponse {
    fn from(outcome: UpsertOutcome) -> Self {
        let status = match outcome {
            UpsertOutcome::Saved => "Saved",
            UpsertOutcome::Deleted => "Deleted",
        };
        Self { status }
    }
}

/// Validated body of `POST /userfilms/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertUserFilm {
    pub film_id: Uuid,
    pub state: FilmState,
    pub favorite: bool,
    pub note: Option<i16>,
    pub review: Option<String>,
}

impl UpsertUserFilm {
    /// Checks every field and reports all failures at once. A malformed film id
    /// cannot name an existing film, so it is reported as not found.
    pub fn from_json(body: &Value) -> AppResult<Self> {
        let empty = Map::new();
        let fields = body.as_object().unwrap_or(&empty);
        let mut errors = ValidationErrors::new();
        if !body.is_object() {
            errors.add("non_field_errors", "invalid", "Expected a JSON object.");
        }

        let film_ref = match fields.get("uuid") {
            None | Some(Value::Null) => {
                errors.add("uuid", "required", "This field is required.");
                None
            },
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(_) => {
                errors.add("uuid", "invalid", "Must be a valid UUID.");
                None
            },
        };

        let state = match fields.get("state") {
            None | Some(Value::Null) => {
                errors.add("state", "required", "This field is required.");
                None
            },
            Some(v) => {
                let state = v.as_i64().and_then(FilmState::from_code);
                if state.is_none() {
                    let message = format!("\"{v}\" is not a valid choice.");
                    errors.add("state", "invalid_choice", message);
                }
                state
            },
        };

        let favorite = match fields.get("favorite") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                errors.add("favorite", "invalid", "Must be a valid boolean.");
                false
            },
        };

        let note = match fields.get("note") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_i64() {
                Some(n) if n < 0 => {
                    errors.add(
                        "note",
                        "min_value",
                        "Ensure this value is greater than or equal to 0.",
                    );
                    None
                },
                Some(n) if n > MAX_NOTE => {
                    errors.add(
                        "note",
                        "max_value",
                        format!("Ensure this value is less than or equal to {MAX_NOTE}."),
                    );
                    None
                },
                Some(n) => i16::try_from(n).ok(),
                None => {
                    errors.add("note", "invalid", "A valid integer is required.");
                    None
                },
            },
        };

        let review = match fields.get("review") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.add("review", "invalid", "Not a valid string.");
                None
            },
        };

        errors.into_result()?;

        let (Some(film_ref), Some(state)) = (film_ref, state) else {
            return Err(anyhow::anyhow!("validated upsert payload is incomplete").into());
        };
        let film_id = Uuid::parse_str(&film_ref).map_err(|_| AppError::NotFound("Film"))?;

        Ok(Self { film_id, state, favorite, note, review })
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub username: String,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self { email: user.email, username: user.username }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub email: String,
    pub username: String,
    pub avatar: Option<String>,
}

impl ProfileResponse {
    pub fn new(user: user::Model, media_url: &str) -> Self {
        Self {
            email: user.email,
            username: user.username,
            avatar: user.avatar.map(|p| media::url(media_url, &p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_full_payload() {
        let id = Uuid::new_v4();
        let body = json!({
            "uuid": id.to_string(),
            "state": 1,
            "favorite": true,
            "note": 8,
            "review": "great",
        });

        let cmd = UpsertUserFilm::from_json(&body).unwrap();
        assert_eq!(
            cmd,
            UpsertUserFilm {
                film_id: id,
                state: FilmState::Watched,
                favorite: true,
                note: Some(8),
                review: Some("great".to_string()),
            }
        );
    }

    #[test]
    fn missing_note_is_null_not_sentinel() {
        let body = json!({ "uuid": Uuid::new_v4().to_string(), "state": 2 });
        let cmd = UpsertUserFilm::from_json(&body).unwrap();
        assert_eq!(cmd.note, None);
        assert!(!cmd.favorite);
        assert_eq!(cmd.state, FilmState::WantToWatch);
    }

    #[test]
    fn reports_every_bad_field() {
        let body = json!({ "state": 7, "note": 11, "favorite": "yes" });
        let Err(AppError::Validation(errors)) = UpsertUserFilm::from_json(&body) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("uuid").unwrap()[0].code, "required");
        assert_eq!(errors.get("state").unwrap()[0].code, "invalid_choice");
        assert_eq!(errors.get("note").unwrap()[0].code, "max_value");
        assert_eq!(errors.get("favorite").unwrap()[0].code, "invalid");
    }

    #[test]
    fn negative_note_is_rejected() {
        let body = json!({ "uuid": Uuid::new_v4().to_string(), "state": 1, "note": -1 });
        let Err(AppError::Validation(errors)) = UpsertUserFilm::from_json(&body) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("note").unwrap()[0].code, "min_value");
    }

    #[test]
    fn malformed_film_id_is_not_found() {
        let body = json!({ "uuid": "not-a-uuid", "state": 1 });
        assert!(matches!(UpsertUserFilm::from_json(&body), Err(AppError::NotFound("Film"))));
    }

    #[test]
    fn state_codes_round_trip() {
        for state in [FilmState::Unset, FilmState::Watched, FilmState::WantToWatch] {
            assert_eq!(FilmState::from_code(state.as_code().into()), Some(state));
        }
        assert_eq!(FilmState::from_code(3), None);
    }
}
