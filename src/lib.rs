pub mod browser;
pub mod core;
pub mod dom;
pub mod extract;
pub mod images;
pub mod ocr;
pub mod persist;
pub mod pipeline;

// --- Primary exports ---
pub use core::config::{load_config, TaolensConfig};
pub use core::types;
pub use core::types::{ImageManifest, ProductRecord};
pub use core::CollectFailure;
pub use pipeline::{ProductAssembler, ScrapeOutcome};
