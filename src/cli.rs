// CLI module - command-line argument parsing and handlers
//
// Provides subcommands for configuration management:
// - config --show: Display effective configuration
// - config --path: Show config file path
// - config --reset: Regenerate config file with defaults
//
// Without a subcommand the headless console runs, reading commands from stdin.

use crate::config::{derive_ws_url, Config, VERSION};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;

/// lode - search, tail and ask questions about your logs
#[derive(Parser, Debug)]
#[command(name = "lode")]
#[command(version = VERSION)]
#[command(about = "Log search, live tail and chat console", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Search service URL (overrides config and LODE_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Socket origin for tail and chat (overrides config and LODE_WS_URL)
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// Start in live tail mode
    #[arg(long)]
    pub live: bool,

    /// Connect the chat channel on startup
    #[arg(long)]
    pub chat: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

impl Cli {
    /// Apply command-line overrides on top of env/file/default config
    pub fn apply(&self, config: &mut Config) {
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
            // Keep sockets on the same host unless told otherwise
            if self.ws_url.is_none() {
                config.ws_url = derive_ws_url(api_url);
            }
        }
        if let Some(ws_url) = &self.ws_url {
            config.ws_url = ws_url.clone();
        }
    }
}

/// Handle CLI subcommands. Returns true if one was handled (exit after).
pub fn handle_cli(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Some(Commands::Config { show, reset, path }) => {
            if *path {
                handle_config_path()?;
            } else if *show {
                handle_config_show(cli)?;
            } else if *reset {
                handle_config_reset()?;
            } else {
                // No flag provided, show help
                println!("Usage: lode config [--show|--reset|--path]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration");
                println!("  --reset   Reset config file to defaults");
                println!("  --path    Show config file path");
            }
            Ok(true)
        }
        None => Ok(false), // No subcommand, run the console
    }
}

fn handle_config_path() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;
    println!("{}", path.display());
    Ok(())
}

fn handle_config_show(cli: &Cli) -> Result<()> {
    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    println!("# Effective configuration (flags > env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    // Show source info
    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    Ok(())
}

fn handle_config_reset() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    // Write the default config (using Config's single source of truth)
    std::fs::write(&path, Config::default().to_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_subcommand_parses() {
        let cli = Cli::try_parse_from(["lode", "config", "--show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config { show: true, .. })
        ));
    }

    #[test]
    fn test_api_url_flag_moves_sockets_too() {
        let cli = Cli::try_parse_from(["lode", "--api-url", "https://logs.example.com"]).unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.api_url, "https://logs.example.com");
        assert_eq!(config.ws_url, "wss://logs.example.com");
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let cli = Cli::try_parse_from([
            "lode",
            "--api-url",
            "http://a:8000",
            "--ws-url",
            "ws://b:9000",
            "--live",
        ])
        .unwrap();
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.ws_url, "ws://b:9000");
        assert!(cli.live);
        assert!(!cli.chat);
    }
}
