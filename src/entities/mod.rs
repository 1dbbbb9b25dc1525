pub mod film;
pub mod film_genre;
pub mod genre;
pub mod session;
pub mod user;
pub mod user_film;
