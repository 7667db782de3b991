mod ingest;
mod layout;
mod reader;
mod recompute;
mod scan;
mod title;

pub use ingest::{sync_session, IngestOutcome, StorePrices, SyncJob};
pub use recompute::recompute_session;
pub use layout::{discover, journal_path, journal_ref, JournalRef};
pub use reader::{read_from_offset, TailRead};
pub use scan::initial_jobs;
pub use title::append_custom_title;
