use utoipa_axum::{router::OpenApiRouter, routes};

use crate::handlers;
use crate::state::AppState;

pub fn api_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::health::health))
        .routes(routes!(handlers::predict::predict))
        .routes(routes!(
            handlers::prediction::get_prediction,
            handlers::prediction::delete_prediction
        ))
        .routes(routes!(handlers::image::get_prediction_image))
        .routes(routes!(handlers::prediction::predictions_by_label))
        .routes(routes!(handlers::prediction::predictions_by_score))
        .routes(routes!(handlers::stats::count_predictions))
        .routes(routes!(handlers::image::get_image))
        .routes(routes!(handlers::stats::recent_labels))
        .routes(routes!(handlers::stats::stats))
}
