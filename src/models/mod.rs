pub mod index_entry;
pub mod scan;
pub mod search;
