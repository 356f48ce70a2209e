//! Bilibili web API client: favorites listing, video details and subtitles.

pub mod client;
pub mod cookie;
pub mod error;
mod types;

pub use client::{BiliClient, ClientConfig};
pub use cookie::CookieHeader;
pub use error::ApiError;
