//! Create follow table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Follow::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Follow::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Follow::AccountId).string_len(32).not_null())
                    .col(ColumnDef::new(Follow::TargetId).string_len(32).not_null())
                    .col(ColumnDef::new(Follow::Uri).string_len(1024).not_null())
                    .col(
                        ColumnDef::new(Follow::Accepted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Follow::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (account_id, target_id) - prevent duplicate follows
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_account_target")
                    .table(Follow::Table)
                    .col(Follow::AccountId)
                    .col(Follow::TargetId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Unique index: uri (Accept/Undo look follows up by activity id)
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_uri")
                    .table(Follow::Table)
                    .col(Follow::Uri)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: target_id (for listing followers)
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_target_id")
                    .table(Follow::Table)
                    .col(Follow::TargetId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Follow::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Follow {
    Table,
    Id,
    AccountId,
    TargetId,
    Uri,
    Accepted,
    CreatedAt,
}
