pub mod ranker;
pub mod summarizer;
