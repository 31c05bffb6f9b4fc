pub mod object_store;

pub use object_store::{FsObjectStore, ObjectStore};
