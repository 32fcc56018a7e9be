pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod image_processing;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod records;
pub mod settle;
pub mod storage;

#[cfg(test)]
mod test_support;
