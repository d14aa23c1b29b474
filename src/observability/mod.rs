pub mod logging;
pub mod sanitization;

#[cfg(test)]
mod tests;

pub use logging::{init_logging, LoggingConfig};
pub use sanitization::{
    sanitize_invoice, sanitize_node_pubkey, sanitize_token, SanitizationConfig, SensitiveData,
    SensitiveDataType,
};
