pub mod article;
pub mod event;

pub use article::ArticleWorkflow;
pub use event::EventWorkflow;
