pub mod chat;
pub mod models;
pub mod prompt_template;
pub mod providers;
