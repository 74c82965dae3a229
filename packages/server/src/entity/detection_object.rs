use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "detection_object")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub session_uid: String,
    #[sea_orm(belongs_to, from = "session_uid", to = "uid")]
    pub session: HasOne<super::prediction_session::Entity>,

    pub label: String,
    pub score: f64,

    /// `[x1, y1, x2, y2]` serialized as a JSON array.
    #[sea_orm(column_type = "Text")]
    pub bbox: String,
}

impl ActiveModelBehavior for ActiveModel {}
