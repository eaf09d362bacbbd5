//! Follow entity (follow relationships between local accounts and remote actors).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "follow")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The follower (account or remote actor id)
    pub account_id: String,

    /// The followee (account or remote actor id)
    pub target_id: String,

    /// Id of the Follow activity
    #[sea_orm(unique)]
    pub uri: String,

    pub accepted: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
