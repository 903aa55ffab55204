pub mod ingest;
pub mod whatsapp;
