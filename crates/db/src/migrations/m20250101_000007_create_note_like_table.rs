//! Create note like table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NoteLike::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NoteLike::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(NoteLike::AccountId).string_len(32).not_null())
                    .col(ColumnDef::new(NoteLike::ObjectUri).string_len(1024).not_null())
                    .col(ColumnDef::new(NoteLike::Uri).string_len(1024).not_null())
                    .col(
                        ColumnDef::new(NoteLike::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_note_like_account")
                            .from(NoteLike::Table, NoteLike::AccountId)
                            .to(Account::Table, Account::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (account_id, object_uri) - one like per object
        manager
            .create_index(
                Index::create()
                    .name("idx_note_like_account_object")
                    .table(NoteLike::Table)
                    .col(NoteLike::AccountId)
                    .col(NoteLike::ObjectUri)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NoteLike::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum NoteLike {
    Table,
    Id,
    AccountId,
    ObjectUri,
    Uri,
    CreatedAt,
}

#[derive(Iden)]
enum Account {
    Table,
    Id,
}
