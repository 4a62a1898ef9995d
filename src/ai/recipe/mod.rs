mod bot;
pub mod fetch;
pub mod models;

pub use bot::{PageSource, RecipeBot};
pub use fetch::{HttpPageFetcher, PageFetcher};
