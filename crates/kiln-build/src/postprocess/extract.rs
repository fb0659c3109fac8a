//! Raw binary extraction

use crate::config::BuildConfig;
use crate::error::BuildResult;
use crate::log::{LogSink, Severity};
use crate::stage::StageOutcome;
use crate::toolchain::{extract_invocation, run_checked, ToolRunner};
use std::fs;
use std::path::Path;

/// `objcopy -O binary` the linked image, unless the binary is already newer
pub fn extract_binary(
    config: &BuildConfig,
    runner: &dyn ToolRunner,
    sink: &dyn LogSink,
    image: &Path,
) -> BuildResult<StageOutcome> {
    let output = &config.raw_binary;
    if is_newer(output, image) {
        sink.log(
            Severity::Info,
            &format!("{} is up to date", config.display_path(output).display()),
        );
        return Ok(StageOutcome::UpToDate);
    }

    let invocation = extract_invocation(config, image, output);
    sink.log(Severity::Debug, &invocation.command_line());
    run_checked(runner, &invocation)?;
    sink.log(
        Severity::Success,
        &format!("Extracted {}", config.display_path(output).display()),
    );
    Ok(StageOutcome::Completed)
}

/// True when `output` exists and is at least as new as `input`
fn is_newer(output: &Path, input: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(output), modified(input)) {
        (Some(out), Some(inp)) => out >= inp,
        _ => false,
    }
}
