pub mod executor;
pub mod models;
pub mod qa_pipeline;
pub mod summary_pipeline;
pub mod task;
pub mod tokenizer;
