//! CLI entry point.

use std::process::ExitCode;

use fence::cli::Cli;
use fence::config::{load_default, load_file, load_template, templates, FenceConfig};
use fence::error::FenceError;
use fence::supervisor::Supervisor;
use fence::utils::init_logging;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.debug, cli.monitor);

    // Internal mode, invoked by the wrapper itself inside the sandbox. Runs
    // without a runtime: it ends in exec().
    if cli.landlock_apply {
        #[cfg(target_os = "linux")]
        {
            return ExitCode::from(fence::sandbox::linux::run_apply(&cli.args, cli.debug));
        }
        #[cfg(not(target_os = "linux"))]
        {
            eprintln!("fence: --landlock-apply is Linux-only");
            return ExitCode::from(1);
        }
    }

    if cli.list_templates {
        for (name, description) in templates::list() {
            println!("{name:<14} {description}");
        }
        return ExitCode::SUCCESS;
    }

    if cli.linux_features {
        #[cfg(target_os = "linux")]
        {
            let features = fence::sandbox::linux::detect();
            print!("{}", fence::sandbox::linux::features::report(features));
            return ExitCode::SUCCESS;
        }
        #[cfg(not(target_os = "linux"))]
        {
            eprintln!("fence: --linux-features is Linux-only");
            return ExitCode::from(1);
        }
    }

    let config = match load_configuration(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fence: {e}");
            return ExitCode::from(1);
        }
    };

    let command = match cli.get_command() {
        Some(command) => command,
        None => {
            eprintln!("fence: no command given; pass one as arguments or with -c");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fence: runtime startup failed: {e}");
            return ExitCode::from(1);
        }
    };

    let supervisor = Supervisor::new(config, cli.ports.clone(), cli.monitor);
    match runtime.block_on(supervisor.run(&command)) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(FenceError::Blocked(block)) => {
            eprintln!("fence: {block}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("fence: {e}");
            ExitCode::from(1)
        }
    }
}

/// `-t` loads a template, `-s` a file, otherwise `~/.fence.json` (or empty).
fn load_configuration(cli: &Cli) -> Result<FenceConfig, FenceError> {
    if let Some(ref name) = cli.template {
        return load_template(name);
    }
    if let Some(ref path) = cli.settings {
        return load_file(path);
    }
    load_default()
}
