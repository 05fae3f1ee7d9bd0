pub mod bootstrap;
pub mod db_internal;
pub mod memory;
pub mod sql;
pub mod store;
pub mod utils;
