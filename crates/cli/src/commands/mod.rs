pub mod ask;
pub mod config_cmd;
pub mod list;
pub mod runtime;
pub mod warm;
