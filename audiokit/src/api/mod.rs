//! HTTP API handlers for audiokit
//!
//! JSON in, JSON out (camelCase); file endpoints stream attachments.

pub mod clip;
pub mod files;
pub mod health;
pub mod merge;
pub mod youtube;

pub use clip::clip_routes;
pub use files::output_routes;
pub use health::health_routes;
pub use merge::merge_routes;
pub use youtube::youtube_routes;
