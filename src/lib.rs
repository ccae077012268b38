pub mod characters;
pub mod config;
pub mod domain;
pub mod migrate;
pub mod remote;
pub mod state;
pub mod storage;
pub mod version;
