//! Readers and writers for the file formats exchanged with downstream tools.
pub mod pointing_record;
