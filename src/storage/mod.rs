pub mod database;
pub mod models;

pub use database::{Database, StoreChange};
pub use models::{Article, ArticleLanguage, Event, OcrStatus};
