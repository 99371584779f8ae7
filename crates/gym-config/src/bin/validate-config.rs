//! Config validation CLI tool
//!
//! Validates a gymd configuration file and reports any errors.

use gym_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a gymd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match gym_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", gym_config::CURRENT_CONFIG_VERSION);
            println!(
                "  Lock timeout: {} ms",
                policy.booking.lock_timeout.as_millis()
            );
            println!("  Missed sweep: {:?}", policy.booking.missed_sweep);
            println!(
                "  Sweep intervals: missed every {}s, expiry every {}s",
                policy.sweeps.missed_interval.as_secs(),
                policy.sweeps.expiry_interval.as_secs()
            );
            println!("  Trainers: {}", policy.trainers.len());

            if !policy.trainers.is_empty() {
                println!();
                println!("Trainers:");
                for trainer in &policy.trainers {
                    let email = trainer.email.as_deref().unwrap_or("no email");
                    println!("  - {} ({}): {}", trainer.id, email, trainer.name);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                gym_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                gym_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                gym_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                gym_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        gym_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
