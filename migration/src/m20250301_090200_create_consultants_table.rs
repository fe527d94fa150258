use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Consultants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Consultants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Consultants::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Consultants::Name).string().not_null())
                    .col(ColumnDef::new(Consultants::Level).string().not_null())
                    .col(ColumnDef::new(Consultants::Salary).double().not_null().default(0.0))
                    .col(ColumnDef::new(Consultants::Skills).json().not_null())
                    .col(ColumnDef::new(Consultants::Assignments).json().not_null())
                    .col(ColumnDef::new(Consultants::Picture).string().not_null())
                    .col(ColumnDef::new(Consultants::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(Consultants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Consultants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One consultant name per organization
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-consultants-organization-name")
                    .table(Consultants::Table)
                    .col(Consultants::OrganizationId)
                    .col(Consultants::Name)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Consultants::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Consultants {
    Table,
    Id,
    OrganizationId,
    Name,
    Level,
    Salary,
    Skills,
    Assignments,
    Picture,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
