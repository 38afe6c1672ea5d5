//! Version command implementation

use crate::cli::Output;
use crate::parallel::available_cores;
use anyhow::Result;

/// Execute the version command
pub async fn execute(output: &Output) -> Result<()> {
    output.header("stemzip Version Information");

    output.key_value("Version:", &format!("{} v{}", crate::PKG_NAME, crate::VERSION), true);
    output.key_value("Description:", crate::PKG_DESCRIPTION, false);
    output.blank_line();

    output.category("Build Information");
    output.key_value("Rust edition:", "2024", false);
    output.key_value("Target:", std::env::consts::ARCH, false);
    output.key_value("Profile:", if cfg!(debug_assertions) { "debug" } else { "release" }, false);
    output.key_value("CPUs available:", &available_cores().to_string(), false);

    output.blank_line();
    output.info("Run 'stemzip --help' for usage information");

    Ok(())
}
