// Library exports for the binary and integration tests
pub mod config;
pub mod error;
pub mod events;
pub mod lsp;
pub mod observability;
pub mod services;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
