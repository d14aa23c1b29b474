pub mod logging;

pub use logging::LoggingEventHandler;
