pub use sea_orm_migration::prelude::*;

mod m20250301_090000_create_organizations_table;
mod m20250301_090100_create_users_table;
mod m20250301_090200_create_consultants_table;
mod m20250301_090300_create_projects_table;
mod m20250315_120000_create_jobs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_090000_create_organizations_table::Migration),
            Box::new(m20250301_090100_create_users_table::Migration),
            Box::new(m20250301_090200_create_consultants_table::Migration),
            Box::new(m20250301_090300_create_projects_table::Migration),
            Box::new(m20250315_120000_create_jobs_table::Migration),
        ]
    }
}
