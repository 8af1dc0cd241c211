//! Client for the Nightwatch Analytics service: natural-language queries,
//! streamed Sentinel scans and the derived views (charts, tables, CSV export).

pub mod api;
pub mod error;
pub mod export;
pub mod logging;
pub mod model;
pub mod query;
pub mod scan;
pub mod state;
pub mod text_summary;
pub mod viz;
