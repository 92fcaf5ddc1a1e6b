pub mod bootstrap;
pub mod commands;
pub mod weekly_summaries;
