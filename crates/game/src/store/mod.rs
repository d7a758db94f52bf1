mod bucket;
mod table;

pub use bucket::{Bucket, BucketError};
pub use table::{DuplicateEntity, EntityTable, Identified};
