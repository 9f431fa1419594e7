//! Database plumbing shared by the ingestion pipeline and its callers

mod init;

pub use init::init_database;
