use sea_orm_migration::prelude::*;

/// Time periods (contest rounds)
#[derive(DeriveIden)]
enum TimePeriods {
    Table,
    Id,
    Name,
    PeriodStart,
    PeriodEnd,
}

/// Participants (one row per external user)
#[derive(DeriveIden)]
enum Participants {
    Table,
    Id,
    UserId,
    FullName,
    Phone,
    Email,
    Chances,
    LastChanceUsedAt,
    ExtraChancesReceived,
    CreatedAt,
    UpdatedAt,
}

/// Prizes
#[derive(DeriveIden)]
enum Prizes {
    Table,
    Id,
    Description,
    TotalUnits,
    CreatedAt,
}

/// Prize <-> period join table, carries the exhaustion flag
#[derive(DeriveIden)]
enum PrizeAvailability {
    Table,
    Id,
    PrizeId,
    PeriodId,
    AllClaimed,
}

/// Claims (reservations of one prize unit)
#[derive(DeriveIden)]
enum Claims {
    Table,
    Id,
    PrizeId,
    ParticipantId,
    PeriodId,
    Confirmed,
    ConfirmedAt,
    UnclaimedAt,
    Answers,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Timestamps are always written by the engine with the caller supplied `now`,
/// so no column carries a database side default clock.
/// Foreign keys are declared inline with the tables (SQLite cannot add them later).
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TimePeriods::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TimePeriods::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TimePeriods::Name).string_len(100).not_null())
                    .col(
                        ColumnDef::new(TimePeriods::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TimePeriods::PeriodEnd)
                            .timestamp_with_time_zone()
                            .null(), // NULL = open ended (current) period
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_time_periods_name_unique")
                    .table(TimePeriods::Table)
                    .col(TimePeriods::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Participants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participants::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Participants::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Participants::FullName)
                            .string_len(60)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Participants::Phone)
                            .string_len(20)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Participants::Email)
                            .string_len(50)
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Participants::Chances)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Participants::LastChanceUsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Participants::ExtraChancesReceived)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Participants::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participants::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // one participant per external user
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_participants_user_unique")
                    .table(Participants::Table)
                    .col(Participants::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Prizes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Prizes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Prizes::Description)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Prizes::TotalUnits)
                            .integer()
                            .not_null()
                            .default(3), // -1 = unlimited, units per period
                    )
                    .col(
                        ColumnDef::new(Prizes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PrizeAvailability::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PrizeAvailability::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PrizeAvailability::PrizeId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PrizeAvailability::PeriodId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PrizeAvailability::AllClaimed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prize_availability_prize")
                            .from(PrizeAvailability::Table, PrizeAvailability::PrizeId)
                            .to(Prizes::Table, Prizes::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_prize_availability_period")
                            .from(PrizeAvailability::Table, PrizeAvailability::PeriodId)
                            .to(TimePeriods::Table, TimePeriods::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_prize_availability_pair_unique")
                    .table(PrizeAvailability::Table)
                    .col(PrizeAvailability::PrizeId)
                    .col(PrizeAvailability::PeriodId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // no ON DELETE CASCADE: claims are history and are never removed
        manager
            .create_table(
                Table::create()
                    .table(Claims::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Claims::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Claims::PrizeId).integer().not_null())
                    .col(ColumnDef::new(Claims::ParticipantId).integer().not_null())
                    .col(ColumnDef::new(Claims::PeriodId).integer().not_null())
                    .col(
                        ColumnDef::new(Claims::Confirmed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Claims::ConfirmedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Claims::UnclaimedAt)
                            .timestamp_with_time_zone()
                            .null(), // NULL = no confirmation required
                    )
                    .col(
                        ColumnDef::new(Claims::Answers)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Claims::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Claims::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_prize")
                            .from(Claims::Table, Claims::PrizeId)
                            .to(Prizes::Table, Prizes::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_participant")
                            .from(Claims::Table, Claims::ParticipantId)
                            .to(Participants::Table, Participants::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claims_period")
                            .from(Claims::Table, Claims::PeriodId)
                            .to(TimePeriods::Table, TimePeriods::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // unit counting scans (prize, period)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_claims_prize_period")
                    .table(Claims::Table)
                    .col(Claims::PrizeId)
                    .col(Claims::PeriodId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_claims_participant")
                    .table(Claims::Table)
                    .col(Claims::ParticipantId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // reverse dependency order
        manager
            .drop_table(Table::drop().if_exists().table(Claims::Table).to_owned())
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(PrizeAvailability::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().if_exists().table(Prizes::Table).to_owned())
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(Participants::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(TimePeriods::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
