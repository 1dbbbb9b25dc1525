pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_accounts;
mod m20240301_000002_create_catalogue;
mod m20240301_000003_create_user_film;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_accounts::Migration),
            Box::new(m20240301_000002_create_catalogue::Migration),
            Box::new(m20240301_000003_create_user_film::Migration),
        ]
    }
}
