use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Jobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Jobs::OrganizationId).uuid().not_null())
                    .col(ColumnDef::new(Jobs::CreatedBy).uuid().not_null())
                    .col(ColumnDef::new(Jobs::Title).string().not_null())
                    .col(ColumnDef::new(Jobs::Department).string().not_null())
                    .col(ColumnDef::new(Jobs::Location).string().not_null())
                    .col(ColumnDef::new(Jobs::JobDescription).text().not_null())
                    .col(ColumnDef::new(Jobs::SalaryMin).double())
                    .col(ColumnDef::new(Jobs::SalaryMax).double())
                    .col(ColumnDef::new(Jobs::VisaSponsorship).boolean().not_null().default(false))
                    .col(ColumnDef::new(Jobs::ShortlistCount).integer().not_null().default(5))
                    .col(ColumnDef::new(Jobs::AdditionalInstructions).text())
                    .col(ColumnDef::new(Jobs::InterviewRounds).json().not_null())
                    .col(ColumnDef::new(Jobs::PublicLink).string().not_null().unique_key())
                    .col(ColumnDef::new(Jobs::Status).string().not_null().default("Published"))
                    .col(ColumnDef::new(Jobs::Candidates).json().not_null()) // embedded candidate documents
                    .col(
                        ColumnDef::new(Jobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Jobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    OrganizationId,
    CreatedBy,
    Title,
    Department,
    Location,
    JobDescription,
    SalaryMin,
    SalaryMax,
    VisaSponsorship,
    ShortlistCount,
    AdditionalInstructions,
    InterviewRounds,
    PublicLink,
    Status,
    Candidates,
    CreatedAt,
    UpdatedAt,
}
