pub mod appresult;
pub mod auth;
pub mod backend;
pub mod client;
pub mod config;
pub mod engagement;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod media;
pub mod model;
pub mod news;
pub mod res;
pub mod session;
pub mod sync;
pub mod trending;
pub mod web;

#[cfg(test)]
mod testing;

pub use appresult::{AppError, AppResult};
pub use web::AppState;
