//! `crucible preview` — deterministic symbolic-execution command preview.

use std::sync::Arc;

use anyhow::Result;

use crucible::config::ApiConfig;
use crucible::runtime::Runtime;
use crucible::step::SymbolicExecution;

pub fn cmd_preview(project_id: &str, flags: Option<&str>) -> Result<()> {
    let runtime = Arc::new(Runtime::new(ApiConfig::from_env())?);
    let symbolic_execution = SymbolicExecution::new(runtime);
    if let Some(flags) = flags {
        symbolic_execution.set_additional_flags(flags);
    }

    println!("{}", symbolic_execution.command_preview(project_id));
    Ok(())
}
