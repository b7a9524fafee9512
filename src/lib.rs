pub mod config;
pub mod desk;
pub mod directory;
pub mod engine;
pub mod grid;
pub mod http;
pub mod limits;
pub mod localtime;
pub mod model;
pub mod observability;
pub mod wal;
