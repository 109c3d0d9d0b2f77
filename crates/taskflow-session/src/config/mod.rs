pub use client_config::{ApiConfig, AuthConfig, ClientConfig, StorageConfig};

mod client_config;
