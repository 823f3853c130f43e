#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod catalog;
pub mod config;
pub mod dwell;
pub mod feed;
pub mod gate;
pub mod session;
pub mod shuffle;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use catalog::{Catalog, CatalogItem};
pub use feed::{FeedEntry, FeedError, FeedSession};
pub use gate::GateState;
pub use shuffle::ShufflePool;
