pub mod credential;
pub mod credential_store;
pub mod file_storage;
pub mod storage;
