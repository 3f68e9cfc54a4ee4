pub mod azure;
pub mod base;
pub mod credentials;
pub mod direct;
pub mod pipeline;
pub mod utils;

#[cfg(test)]
pub mod mock;
