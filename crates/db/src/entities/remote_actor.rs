//! Remote actor cache entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "remote_actor")]
pub struct Model {
    /// Local surrogate key; never changes once minted.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Actor identity IRI.
    #[sea_orm(unique)]
    pub uri: String,

    pub username: String,

    pub host: String,

    pub inbox: String,

    #[sea_orm(nullable)]
    pub shared_inbox: Option<String>,

    #[sea_orm(nullable)]
    pub outbox: Option<String>,

    #[sea_orm(nullable)]
    pub display_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub public_key_pem: String,

    pub last_fetched_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
