//! Create delivery queue table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryQueue::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryQueue::Inbox).string_len(1024).not_null())
                    .col(ColumnDef::new(DeliveryQueue::Payload).text().not_null())
                    .col(
                        ColumnDef::new(DeliveryQueue::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeliveryQueue::NextRetryAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: next_retry_at (drain selects due rows)
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_queue_next_retry_at")
                    .table(DeliveryQueue::Table)
                    .col(DeliveryQueue::NextRetryAt)
                    .to_owned(),
            )
            .await?;

        // Index: inbox (operator purge)
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_queue_inbox")
                    .table(DeliveryQueue::Table)
                    .col(DeliveryQueue::Inbox)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryQueue::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeliveryQueue {
    Table,
    Id,
    Inbox,
    Payload,
    Attempts,
    NextRetryAt,
    CreatedAt,
}
