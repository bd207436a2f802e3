pub mod config_cmd;
pub mod history_cmd;
pub mod output;
pub mod renderer;
pub mod usage_cmd;
pub mod watch_cmd;
