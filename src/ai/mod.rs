pub mod chat;
pub mod prompt;
pub mod recipe;
pub mod structured;
