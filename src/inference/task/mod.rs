pub mod answer;
pub mod summarize;
