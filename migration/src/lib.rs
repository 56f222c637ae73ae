pub use sea_orm_migration::prelude::*;

mod m20130501_000001_create_referee_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20130501_000001_create_referee_tables::Migration)]
    }
}
