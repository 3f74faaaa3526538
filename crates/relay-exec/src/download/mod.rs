//! Downloaders placing project content into a working area.

mod archive;
pub use archive::{ArchiveDownloader, extract_zip};

mod git;
pub use git::GitDownloader;
