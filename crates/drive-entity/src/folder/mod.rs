//! Folder entities.

pub mod model;

pub use model::{FolderRecord, NewFolder, PATH_SEPARATOR};
