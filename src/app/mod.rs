pub(crate) mod config_manager;
pub(crate) mod exit_handler;
pub(crate) mod progress_manager;
pub(crate) mod report_sink;
pub(crate) mod runtime;
pub(crate) mod terminal;
