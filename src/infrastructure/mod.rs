//! Infrastructure layer: configuration, logging, page parsing, the HTTP
//! metrics client and the status broadcast channel.

pub mod config;
pub mod display;
pub mod id_extractor;
pub mod logging;
pub mod metrics_api;
pub mod page_context;
pub mod status_broadcaster;
pub mod table_index;

pub use config::{AppConfig, ConfigManager, FileSettingsProvider, InMemorySettingsProvider};
pub use display::LoggingAnnotationSink;
pub use logging::{init_logging, init_logging_with_config};
pub use metrics_api::HttpMetricsClient;
pub use page_context::StaticPageProvider;
pub use status_broadcaster::StatusBroadcaster;
pub use table_index::{ColumnIndexMap, ColumnKey, TableIndexMapper};
