pub mod ledger;
pub mod memory_store;
pub mod object_store;
pub mod s3;
pub mod storage_resolver;
pub mod transform;
pub mod uploads;
