//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{exit_code, map_error};
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{format_record, format_render_report, format_run_report, format_status};
pub use route::RunContext;
