pub mod config;
pub mod error;
pub mod ledger;
pub mod model;
pub mod registry;
pub mod retry;
pub mod storage;
