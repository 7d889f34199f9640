mod catalog;
mod flags;
mod genbank;
mod layout;
mod orchestrator;
mod tickets;

pub use catalog::{CatalogFile, EmptyCatalog, HttpCatalog, JsonFileCatalog, ReferenceCatalog};
pub use flags::{load_custom_flags, parse_custom_flags};
pub use genbank::{list_flat_files, parse_flat_file, record_from_seq, GenomeIdField};
pub use layout::{Area, BundleTrace, RecordSummary, ResultsLayout, Transfer};
pub use orchestrator::{
    resolve_run_modes, run_import, ImportConfig, RunSummary, TicketOutcome, UnreadableFile,
    DEFAULT_AUTHOR,
};
pub use tickets::{read_tickets, write_tickets, TICKET_COLUMNS};
