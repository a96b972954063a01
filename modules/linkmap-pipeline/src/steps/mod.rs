//! The six pipeline steps. Each reads from the store, computes, writes
//! back, and returns a small checkpointable summary.

mod embed;
mod export;
mod insight;
mod related;
mod scrape;
mod summarize;

pub use embed::embed;
pub use export::export;
pub use insight::insight;
pub use related::related;
pub use scrape::scrape;
pub use summarize::summarize;
