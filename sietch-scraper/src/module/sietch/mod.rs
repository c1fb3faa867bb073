///! Sietch population tracker
///!
///! Renders the server-status page, parses every server's sietch table
///! and stores the readings as a time-series.

pub mod browser;
pub mod memory_store;
pub mod parser;
pub mod pg_store;
pub mod store;
pub mod updater;

pub use browser::{ChromeRenderer, PageRenderer};
pub use parser::{ExtractionReport, extract, parse_status_html};
pub use store::{MemoryStore, PgStore, SnapshotStore, open_store};
pub use updater::{ScrapeResult, SietchUpdater};
