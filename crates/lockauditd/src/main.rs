use anyhow::Result;
use lockauditd::cli::parse_cli;
use lockauditd::commands::run;
use lockauditd::logging::init_tracing;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format, cli.verbose)?;
    run(cli)
}
