mod common;

mod auth;
mod predict;
mod stats;
