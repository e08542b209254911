// File I/O: raw batches, pivot tables, result tables, archives

pub mod archive;
pub mod batch;
pub mod pivot;
pub mod split;
pub mod tables;

pub use archive::archive_and_remove;
pub use batch::read_batch;
pub use pivot::{load_or_empty, read_pivot, write_pivot};
pub use split::{split_batch, split_file, SplitFile};
pub use tables::{write_golden, write_relations};
