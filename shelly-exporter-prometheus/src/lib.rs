//! Prometheus exporter for Shelly devices.
//!
//! On every scrape, the exporter fetches `/settings` and `/status` from each
//! requested device and translates them into Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   HTTP Server   │────>│     Fetcher     │────>│ Shelly devices  │
//! │   (/metrics)    │     │ (per target)    │     │ /settings       │
//! └─────────────────┘     └─────────────────┘     │ /status         │
//!          ^                       │              └─────────────────┘
//!          │              ┌─────────────────┐
//!          └──────────────│   Translator    │
//!                         └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! shelly-exporter-prometheus --port 8000
//! curl 'http://localhost:8000/metrics?target[]=192.168.1.20&target[]=192.168.1.21'
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] and [`args::Args`].

pub mod args;
pub mod config;
pub mod exposition;
pub mod fetcher;
pub mod http;
pub mod scrape;
pub mod translate;

pub use args::Args;
pub use config::ExporterConfig;
pub use fetcher::{DeviceDocuments, FetchError, Fetcher};
pub use http::{HttpServer, create_router};
pub use scrape::{render_body, scrape_target, scrape_targets};
pub use translate::translate;
