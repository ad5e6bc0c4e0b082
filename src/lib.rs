//! Mail Campaign: paced, resumable bulk email dispatch.

pub mod audit;
pub mod campaign;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mailer;
pub mod pacing;
pub mod progress;
pub mod recipients;
pub mod template;
