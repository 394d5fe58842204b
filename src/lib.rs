pub mod ai;
pub mod config;
pub mod drive;
pub mod ocr;
pub mod storage;
pub mod utils;
pub mod workflow;
