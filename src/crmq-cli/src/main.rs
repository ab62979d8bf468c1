use std::io;
use std::path::Path;
use std::process;

use anyhow::{bail, Result};
use clap::CommandFactory;
use clap_complete::generate;
use crmq_dsl::format_any_error;
use crmq_shared::BuildInfo;

use crmq_cli::cli::{parse_args, Cli, Commands, ConfigCommands};
use crmq_cli::config::{create_default_config_file, validate_config, Config};
use crmq_cli::executor::{CompileOptions, Executor};
use crmq_cli::output::OutputWriter;

/// Exit status for search documents rejected by the parser or compiler
const EXIT_INVALID_DSL: i32 = 2;

fn main() {
    // Check for --version flag and show enhanced version info
    if std::env::args().any(|arg| arg == "--version" || arg == "-V") {
        print_version();
        return;
    }

    if let Err(err) = run() {
        process::exit(report_error(&err));
    }
}

fn print_version() {
    let info = BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        git_hash: option_env!("GIT_HASH"),
        build_date: option_env!("BUILD_DATE"),
        rust_version: option_env!("RUSTC_VERSION"),
    };
    print!("{}", info);
}

fn run() -> Result<()> {
    let args = parse_args();

    // Load configuration
    let mut config = Config::load()?;
    if let Some(config_path) = &args.config {
        config.merge_file(config_path)?;
    }
    config.apply_cli(&args);

    setup_logging(&config);
    validate_config(&config)?;

    dispatch(args, config)
}

fn dispatch(args: Cli, config: Config) -> Result<()> {
    let output = OutputWriter::new(&config);
    match args.command {
        Commands::Parse { input } => {
            let document = input.read()?;
            let executor = Executor::new(config);
            let parsed = executor.parse(&input.resource, &document)?;
            output.print_json(&parsed)
        }
        Commands::Compile {
            input,
            tenant,
            allow_restricted,
            search,
            search_fields,
            sql_only,
        } => {
            let document = if input.dsl.is_none() && input.file.is_none() && search.is_some() {
                // --search alone is a complete request
                String::new()
            } else {
                input.read()?
            };
            let options = CompileOptions {
                tenant,
                allow_restricted,
                search,
                search_fields,
            };
            let executor = Executor::new(config);
            let compiled = executor.compile(&input.resource, &document, &options)?;
            if sql_only {
                println!("{}", compiled.sql);
                Ok(())
            } else {
                output.print_json(&compiled)
            }
        }
        Commands::Fields { resource } => {
            let executor = Executor::new(config);
            output.print_json(&executor.fields(&resource)?)
        }
        Commands::Completions { shell } => generate_completions(shell),
        Commands::Config { command } => handle_config_command(command, &config),
    }
}

fn handle_config_command(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(config)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", yaml);
            Ok(())
        }
        ConfigCommands::Init { path, force } => init_config(&path, force),
        ConfigCommands::Check { path } => {
            println!("Checking {}", path.display());
            let loaded = Config::load_from_file(&path)?;
            validate_config(&loaded)?;
            println!("  ✓ Valid");
            for name in loaded.registries.keys() {
                println!("  registry '{}'", name);
            }
            Ok(())
        }
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file {} already exists (use --force to overwrite)",
            path.display()
        );
    }
    create_default_config_file(path)?;
    println!("Created config file: {}", path.display());
    Ok(())
}

fn generate_completions(shell: clap_complete::Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn setup_logging(config: &Config) {
    let log_level = match config.debug.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new().filter_level(log_level).init();
}

/// Print `err` and pick the exit status
///
/// DSL errors print the human report on stderr and the machine report on
/// stdout.
fn report_error(err: &anyhow::Error) -> i32 {
    if is_broken_pipe(err) {
        return 0;
    }

    if let Some(report) = err.chain().find_map(format_any_error) {
        eprintln!("{}", report.human);
        println!("{}", report.machine_json());
        return EXIT_INVALID_DSL;
    }

    eprintln!("Error: {:#}", err);
    1
}

/// Piping into `head` closes stdout early; that is not a failure
fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap_complete::Shell;
    use crmq_dsl::{ErrorCode, SearchDslError};
    use tempfile::TempDir;

    #[test]
    fn test_generate_completions_bash() {
        assert!(generate_completions(Shell::Bash).is_ok());
    }

    #[test]
    fn test_generate_completions_zsh() {
        assert!(generate_completions(Shell::Zsh).is_ok());
    }

    #[test]
    fn test_report_error_exit_codes() {
        let dsl = anyhow::Error::new(SearchDslError::new(ErrorCode::UnknownField, "Unknown field 'x'"));
        assert_eq!(report_error(&dsl), EXIT_INVALID_DSL);

        let wrapped = dsl.context("while compiling");
        assert_eq!(report_error(&wrapped), EXIT_INVALID_DSL);

        assert_eq!(report_error(&anyhow::anyhow!("Unknown resource 'deals'")), 1);

        let pipe = anyhow::Error::new(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(report_error(&pipe), 0);
    }

    #[test]
    fn test_init_config_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("crmq.toml");

        init_config(&path, false).unwrap();
        assert!(path.exists());

        let err = init_config(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(init_config(&path, true).is_ok());
    }

    #[test]
    fn test_config_check() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("crmq.toml");
        std::fs::write(&path, "[pagination]\ndefault_limit = 0\n").unwrap();

        let result = handle_config_command(ConfigCommands::Check { path }, &Config::default());
        assert!(result.is_err());
    }
}
