//! Create remote actor cache table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RemoteActor::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RemoteActor::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RemoteActor::Uri).string_len(1024).not_null())
                    .col(ColumnDef::new(RemoteActor::Username).string_len(128).not_null())
                    .col(ColumnDef::new(RemoteActor::Host).string_len(256).not_null())
                    .col(ColumnDef::new(RemoteActor::Inbox).string_len(1024).not_null())
                    .col(ColumnDef::new(RemoteActor::SharedInbox).string_len(1024))
                    .col(ColumnDef::new(RemoteActor::Outbox).string_len(1024))
                    .col(ColumnDef::new(RemoteActor::DisplayName).string_len(256))
                    .col(ColumnDef::new(RemoteActor::Summary).text())
                    .col(ColumnDef::new(RemoteActor::AvatarUrl).string_len(1024))
                    .col(ColumnDef::new(RemoteActor::PublicKeyPem).text().not_null())
                    .col(
                        ColumnDef::new(RemoteActor::LastFetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: uri - one cache row per actor identity
        manager
            .create_index(
                Index::create()
                    .name("idx_remote_actor_uri")
                    .table(RemoteActor::Table)
                    .col(RemoteActor::Uri)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: host (for per-server administration)
        manager
            .create_index(
                Index::create()
                    .name("idx_remote_actor_host")
                    .table(RemoteActor::Table)
                    .col(RemoteActor::Host)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RemoteActor::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum RemoteActor {
    Table,
    Id,
    Uri,
    Username,
    Host,
    Inbox,
    SharedInbox,
    Outbox,
    DisplayName,
    Summary,
    AvatarUrl,
    PublicKeyPem,
    LastFetchedAt,
}
