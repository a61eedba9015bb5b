pub mod config;
pub mod counter;

pub use config::Config;
pub use counter::TokenCounter;
