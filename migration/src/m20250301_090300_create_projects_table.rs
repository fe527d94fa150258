use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Projects::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Projects::Name).string().not_null())
                    .col(ColumnDef::new(Projects::Client).string().not_null())
                    .col(ColumnDef::new(Projects::RequiredSkills).json().not_null())
                    .col(ColumnDef::new(Projects::StartDate).date().not_null())
                    .col(ColumnDef::new(Projects::EndDate).date().not_null())
                    .col(ColumnDef::new(Projects::Status).string().not_null().default("Discussions"))
                    .col(ColumnDef::new(Projects::TeamSize).json().not_null())
                    .col(ColumnDef::new(Projects::ChanceToClose).integer().not_null().default(100))
                    .col(ColumnDef::new(Projects::AssignedConsultants).json().not_null())
                    .col(ColumnDef::new(Projects::UpdatedBy).uuid())
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Projects::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-projects-organization-name")
                    .table(Projects::Table)
                    .col(Projects::OrganizationId)
                    .col(Projects::Name)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    OrganizationId,
    Name,
    Client,
    RequiredSkills,
    StartDate,
    EndDate,
    Status,
    TeamSize,
    ChanceToClose,
    AssignedConsultants,
    UpdatedBy,
    CreatedAt,
    UpdatedAt,
}
