pub mod index;
pub mod ingest;
pub mod session;
pub mod status;
