pub mod capture;
pub mod database;
pub mod gateway;
pub mod storage;
pub mod sync;
