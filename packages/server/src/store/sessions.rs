use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, Func, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set, TransactionSession, TransactionTrait,
};

use crate::detector::Detection;
use crate::entity::{detection_object, prediction_session};

/// Most frequent labels reported by [`SessionStore::recent_stats`].
const TOP_LABELS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// Aggregate over an owner's sessions within a trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentStats {
    pub count: u64,
    /// Mean detection score; `0.0` when the window holds no detections.
    pub avg_score: f64,
    pub top_labels: Vec<LabelCount>,
}

/// Persistence for prediction sessions and their detections.
///
/// Every read and delete takes the requesting owner and filters on it. A
/// session owned by someone else is reported exactly like a missing one, and
/// sessions with no owner match no caller.
pub struct SessionStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> SessionStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn create_session(
        &self,
        uid: &str,
        original_location: &str,
        predicted_location: &str,
        owner: Option<&str>,
    ) -> Result<prediction_session::Model, DbErr> {
        prediction_session::ActiveModel {
            uid: Set(uid.to_string()),
            timestamp: Set(Utc::now()),
            original_image: Set(original_location.to_string()),
            predicted_image: Set(predicted_location.to_string()),
            owner: Set(owner.map(str::to_string)),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    /// Batch-insert detections for an existing session. An empty batch is a no-op.
    pub async fn add_detections(
        &self,
        session_uid: &str,
        detections: &[Detection],
    ) -> Result<(), DbErr> {
        if detections.is_empty() {
            return Ok(());
        }

        let rows = detections
            .iter()
            .map(|d| {
                let bbox = serde_json::to_string(&d.bbox)
                    .map_err(|e| DbErr::Custom(format!("bbox encode: {e}")))?;
                Ok(detection_object::ActiveModel {
                    session_uid: Set(session_uid.to_string()),
                    label: Set(d.label.clone()),
                    score: Set(d.score),
                    bbox: Set(bbox),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, DbErr>>()?;

        detection_object::Entity::insert_many(rows)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    pub async fn get_session(
        &self,
        uid: &str,
        owner: &str,
    ) -> Result<Option<prediction_session::Model>, DbErr> {
        prediction_session::Entity::find_by_id(uid.to_string())
            .filter(prediction_session::Column::Owner.eq(owner))
            .one(self.conn)
            .await
    }

    /// Detections of a session, in insertion order.
    ///
    /// Unfiltered: callers must have passed [`Self::get_session`] first.
    pub async fn get_detections(
        &self,
        session_uid: &str,
    ) -> Result<Vec<detection_object::Model>, DbErr> {
        detection_object::Entity::find()
            .filter(detection_object::Column::SessionUid.eq(session_uid))
            .order_by_asc(detection_object::Column::Id)
            .all(self.conn)
            .await
    }

    /// Owned sessions with at least one detection labelled `label`.
    pub async fn list_by_label(
        &self,
        label: &str,
        owner: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>, DbErr> {
        self.list_matching(
            Condition::all().add(detection_object::Column::Label.eq(label)),
            owner,
        )
        .await
    }

    /// Owned sessions with at least one detection scoring `min_score` or more.
    pub async fn list_by_score(
        &self,
        min_score: f64,
        owner: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>, DbErr> {
        self.list_matching(
            Condition::all().add(detection_object::Column::Score.gte(min_score)),
            owner,
        )
        .await
    }

    /// One row per session, newest first, however many detections matched.
    async fn list_matching(
        &self,
        detection_filter: Condition,
        owner: &str,
    ) -> Result<Vec<(String, DateTime<Utc>)>, DbErr> {
        let matching_uids = detection_object::Entity::find()
            .select_only()
            .column(detection_object::Column::SessionUid)
            .filter(detection_filter)
            .into_query();

        prediction_session::Entity::find()
            .select_only()
            .column(prediction_session::Column::Uid)
            .column(prediction_session::Column::Timestamp)
            .filter(prediction_session::Column::Owner.eq(owner))
            .filter(prediction_session::Column::Uid.in_subquery(matching_uids))
            .order_by_desc(prediction_session::Column::Timestamp)
            .order_by_asc(prediction_session::Column::Uid)
            .into_tuple()
            .all(self.conn)
            .await
    }

    pub async fn count_recent_sessions(
        &self,
        owner: &str,
        window: Duration,
    ) -> Result<u64, DbErr> {
        prediction_session::Entity::find()
            .filter(recent_owned(owner, window))
            .count(self.conn)
            .await
    }

    /// Distinct labels detected in the owner's recent sessions, sorted.
    pub async fn list_recent_labels(
        &self,
        owner: &str,
        window: Duration,
    ) -> Result<Vec<String>, DbErr> {
        detection_object::Entity::find()
            .select_only()
            .column(detection_object::Column::Label)
            .distinct()
            .filter(detection_object::Column::SessionUid.in_subquery(recent_uids(owner, window)))
            .order_by_asc(detection_object::Column::Label)
            .into_tuple()
            .all(self.conn)
            .await
    }

    pub async fn recent_stats(
        &self,
        owner: &str,
        window: Duration,
    ) -> Result<RecentStats, DbErr> {
        let count = self.count_recent_sessions(owner, window).await?;

        let avg_score = detection_object::Entity::find()
            .select_only()
            .column_as(
                Expr::expr(Func::avg(Expr::col(detection_object::Column::Score))),
                "avg_score",
            )
            .filter(detection_object::Column::SessionUid.in_subquery(recent_uids(owner, window)))
            .into_tuple::<Option<f64>>()
            .one(self.conn)
            .await?
            .flatten()
            .unwrap_or(0.0);

        let top_labels = detection_object::Entity::find()
            .select_only()
            .column(detection_object::Column::Label)
            .column_as(detection_object::Column::Id.count(), "label_count")
            .filter(detection_object::Column::SessionUid.in_subquery(recent_uids(owner, window)))
            .group_by(detection_object::Column::Label)
            .order_by_desc(detection_object::Column::Id.count())
            .order_by_asc(detection_object::Column::Label)
            .limit(TOP_LABELS)
            .into_tuple::<(String, i64)>()
            .all(self.conn)
            .await?
            .into_iter()
            .map(|(label, count)| LabelCount {
                label,
                count: count.max(0) as u64,
            })
            .collect();

        Ok(RecentStats {
            count,
            avg_score,
            top_labels,
        })
    }

    /// Whether `location` is the original or predicted file of a session owned by `owner`.
    pub async fn is_location_owned(
        &self,
        location: &str,
        owner: &str,
    ) -> Result<bool, DbErr> {
        let n = prediction_session::Entity::find()
            .filter(prediction_session::Column::Owner.eq(owner))
            .filter(
                Condition::any()
                    .add(prediction_session::Column::OriginalImage.eq(location))
                    .add(prediction_session::Column::PredictedImage.eq(location)),
            )
            .count(self.conn)
            .await?;
        Ok(n > 0)
    }
}

impl<'a, C: ConnectionTrait + TransactionTrait> SessionStore<'a, C> {
    /// Insert a session and its detections as one unit.
    pub async fn persist(
        &self,
        uid: &str,
        original_location: &str,
        predicted_location: &str,
        owner: Option<&str>,
        detections: &[Detection],
    ) -> Result<prediction_session::Model, DbErr> {
        let txn = self.conn.begin().await?;
        let store = SessionStore::new(&txn);
        let session = store
            .create_session(uid, original_location, predicted_location, owner)
            .await?;
        store.add_detections(uid, detections).await?;
        txn.commit().await?;
        Ok(session)
    }

    /// Remove an owned session and its detections.
    ///
    /// Returns the `(original, predicted)` locations for file cleanup, or `None`
    /// when nothing owned by `owner` has that uid. Nothing is deleted in that case.
    pub async fn delete_session(
        &self,
        uid: &str,
        owner: &str,
    ) -> Result<Option<(String, String)>, DbErr> {
        let txn = self.conn.begin().await?;

        let Some(session) = SessionStore::new(&txn).get_session(uid, owner).await? else {
            return Ok(None);
        };

        detection_object::Entity::delete_many()
            .filter(detection_object::Column::SessionUid.eq(uid))
            .exec(&txn)
            .await?;

        let res = prediction_session::Entity::delete_many()
            .filter(prediction_session::Column::Uid.eq(uid))
            .filter(prediction_session::Column::Owner.eq(owner))
            .exec(&txn)
            .await?;

        if res.rows_affected == 0 {
            // Lost a race with a concurrent delete; the dropped txn rolls back.
            return Ok(None);
        }

        txn.commit().await?;
        Ok(Some((session.original_image, session.predicted_image)))
    }
}

fn window_start(window: Duration) -> DateTime<Utc> {
    Utc::now() - window
}

fn recent_owned(owner: &str, window: Duration) -> Condition {
    Condition::all()
        .add(prediction_session::Column::Owner.eq(owner))
        .add(prediction_session::Column::Timestamp.gte(window_start(window)))
}

fn recent_uids(owner: &str, window: Duration) -> SelectStatement {
    prediction_session::Entity::find()
        .select_only()
        .column(prediction_session::Column::Uid)
        .filter(recent_owned(owner, window))
        .into_query()
}
