use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "prediction_session")]
pub struct Model {
    /// UUIDv4 generated per ingestion, in canonical string form.
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,

    pub timestamp: DateTimeUtc,

    /// Local scratch path of the uploaded or fetched image.
    pub original_image: String,
    /// Local scratch path of the annotated copy.
    pub predicted_image: String,

    /// Username of the creator. NULL for anonymous ingestion.
    pub owner: Option<String>,

    #[sea_orm(has_many)]
    pub detections: HasMany<super::detection_object::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
