pub mod budget;
pub mod fs_store;
pub mod object_store;
pub mod s3_store;
