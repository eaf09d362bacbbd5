//! Create inbound activity table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InboundActivity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InboundActivity::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(InboundActivity::Uri).string_len(1024).not_null())
                    .col(
                        ColumnDef::new(InboundActivity::ActivityType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InboundActivity::ActorUri)
                            .string_len(1024)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InboundActivity::ObjectUri)
                            .string_len(1024)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InboundActivity::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: object_uri (reply-parent lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_inbound_activity_object_uri")
                    .table(InboundActivity::Table)
                    .col(InboundActivity::ObjectUri)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InboundActivity::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum InboundActivity {
    Table,
    Id,
    Uri,
    ActivityType,
    ActorUri,
    ObjectUri,
    ReceivedAt,
}
