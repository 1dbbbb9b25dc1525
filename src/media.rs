//! Media files live outside the database; rows store a relative path of the
//! form `{kind}/{owner_id}/{filename}` which is resolved against `MEDIA_URL`.

use std::fmt::Display;

pub const FILMS: &str = "films";
pub const AVATARS: &str = "avatars";

pub fn path(kind: &str, owner: impl Display, filename: &str) -> String {
    let filename = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    format!("{kind}/{owner}/{filename}")
}

pub fn url(media_url: &str, path: &str) -> String {
    format!("{}/{}", media_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_owner_scoped_path() {
        assert_eq!(path(FILMS, 42, "poster.jpg"), "films/42/poster.jpg");
        assert_eq!(path(AVATARS, 7, "../../etc/passwd"), "avatars/7/passwd");
    }

    #[test]
    fn joins_media_url() {
        assert_eq!(url("/media/", "films/1/a.png"), "/media/films/1/a.png");
        assert_eq!(
            url("https://cdn.example.com/m", "/avatars/2/b.png"),
            "https://cdn.example.com/m/avatars/2/b.png"
        );
    }
}
