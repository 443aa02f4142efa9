pub mod aggregator;
pub mod classifier;
pub mod consistency;
pub mod date_window;
pub mod engine;
pub mod executor;
pub mod splitter;
pub mod translator;
