//! Repository facade for the warcrepo system
//!
//! Coordinates the artifact index and the WARC data store so the
//! repository invariants hold under the add / commit / delete protocols.

pub mod repository;

pub use repository::WarcRepository;
