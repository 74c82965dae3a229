pub mod detection_object;
pub mod prediction_session;
pub mod user;
