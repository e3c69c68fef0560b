// CLI module - command-line argument parsing and config handlers
//
// List commands are run by `commands`; the interactive loop lives in
// `session`. Configuration management is handled here:
// - config --show: Display effective configuration
// - config --path: Show config file path
// - config --reset: Regenerate config file with defaults, keeping db_path
// - config --edit: Open config file in $VISUAL/$EDITOR, then validate it

use crate::config::{Config, VERSION};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

/// shoplist - a personal shopping list
#[derive(Parser)]
#[command(name = "shoplist")]
#[command(version = VERSION)]
#[command(about = "Personal shopping list with live-updating views", long_about = None)]
pub struct Cli {
    /// Without a subcommand, starts an interactive session
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Add an item
    Add {
        name: String,
        /// Quantity; anything that is not a whole number counts as 1
        quantity: String,
    },

    /// Print the list with progress
    List {
        /// Only items whose name contains this text (case-sensitive)
        #[arg(long, short)]
        search: Option<String>,

        /// Print the items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark an item as bought
    Check { id: i64 },

    /// Mark an item as not bought
    Uncheck { id: i64 },

    /// Change an item's name or quantity
    Edit {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        quantity: Option<String>,
    },

    /// Remove an item
    Delete { id: i64 },

    /// Remove every item
    Clear,

    /// Print the list as shareable text
    Share {
        /// Also copy the text to the system clipboard
        #[arg(long)]
        copy: bool,
    },

    /// Interactive session that redraws as the list changes
    Session {
        /// Initial search text
        #[arg(long, short)]
        search: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults (keeps db_path)
        #[arg(long)]
        reset: bool,

        /// Open config file in $VISUAL or $EDITOR
        #[arg(long)]
        edit: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle `config` flags
pub fn handle_config(show: bool, reset: bool, edit: bool, path: bool) -> Result<()> {
    if path {
        println!("{}", config_path()?.display());
    } else if show {
        handle_config_show();
    } else if reset {
        handle_config_reset()?;
    } else if edit {
        handle_config_edit()?;
    } else {
        println!("Usage: shoplist config [--show|--reset|--edit|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults (keeps db_path)");
        println!("  --edit    Open config file in $VISUAL or $EDITOR");
        println!("  --path    Show config file path");
    }
    Ok(())
}

fn config_path() -> Result<PathBuf> {
    Config::config_path().context("Could not determine config path (no home directory)")
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

/// Default config text, carrying over `db_path` from `existing` so a reset
/// never points the app at an empty list
fn reset_contents(existing: Option<&str>) -> String {
    let mut config = Config::default();
    if let Some(db_path) = existing
        .and_then(|contents| Config::parse(contents).ok())
        .and_then(|file| file.db_path)
    {
        config.db_path = PathBuf::from(db_path);
    }
    config.to_toml()
}

fn handle_config_reset() -> Result<()> {
    let path = config_path()?;

    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let contents = reset_contents(existing.as_deref());

    if existing.as_deref() == Some(contents.as_str()) {
        println!("Config already matches defaults: {}", path.display());
        return Ok(());
    }
    if existing.is_some() && !confirm(&format!("Reset {} to defaults?", path.display()))? {
        println!("Aborted.");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

/// Ask a yes/no question on stderr; anything but "y" is no
fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read answer")?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// `$VISUAL`, then `$EDITOR`, then a platform default. Blank values are
/// skipped.
fn editor_command(visual: Option<String>, editor: Option<String>) -> String {
    visual
        .into_iter()
        .chain(editor)
        .find(|e| !e.trim().is_empty())
        .unwrap_or_else(|| {
            if cfg!(windows) {
                "notepad".to_string()
            } else {
                "vi".to_string()
            }
        })
}

fn handle_config_edit() -> Result<()> {
    let path = config_path()?;

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = editor_command(std::env::var("VISUAL").ok(), std::env::var("EDITOR").ok());
    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor '{}' (set $EDITOR)", editor))?;
    if !status.success() {
        bail!("Editor exited with status: {}", status);
    }

    // Catch mistakes now rather than on the next list command
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match Config::parse(&contents) {
        Ok(_) => println!("Config saved: {}", path.display()),
        Err(e) => eprintln!(
            "Warning: {} does not parse and will stop shoplist from starting:\n{}",
            path.display(),
            e
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Option<Commands> {
        let mut argv = vec!["shoplist"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_no_subcommand_means_session() {
        assert_eq!(parse(&[]), None);
    }

    #[test]
    fn test_add_keeps_quantity_as_text() {
        assert_eq!(
            parse(&["add", "Eggs", "bad"]),
            Some(Commands::Add {
                name: "Eggs".to_string(),
                quantity: "bad".to_string()
            })
        );
    }

    #[test]
    fn test_list_flags() {
        assert_eq!(
            parse(&["list", "--search", "Mi", "--json"]),
            Some(Commands::List {
                search: Some("Mi".to_string()),
                json: true
            })
        );
    }

    #[test]
    fn test_edit_optional_fields() {
        assert_eq!(
            parse(&["edit", "3", "--quantity", "4"]),
            Some(Commands::Edit {
                id: 3,
                name: None,
                quantity: Some("4".to_string())
            })
        );
    }

    #[test]
    fn test_check_requires_numeric_id() {
        assert!(Cli::try_parse_from(["shoplist", "check", "milk"]).is_err());
    }

    #[test]
    fn test_reset_keeps_db_path() {
        let contents = reset_contents(Some(
            "db_path = \"/lists/weekly.db\"\n[live]\nstop_timeout_ms = 0\n",
        ));
        let config = Config::from_file(Config::parse(&contents).unwrap(), None);

        assert_eq!(config.db_path, PathBuf::from("/lists/weekly.db"));
        assert_eq!(config.live, Config::default().live);
    }

    #[test]
    fn test_reset_of_missing_or_broken_file_is_plain_defaults() {
        let defaults = Config::default().to_toml();
        assert_eq!(reset_contents(None), defaults);
        assert_eq!(reset_contents(Some("db_path = ")), defaults);
    }

    #[test]
    fn test_editor_prefers_visual_then_editor() {
        let some = |s: &str| Some(s.to_string());
        assert_eq!(editor_command(some("code"), some("nano")), "code");
        assert_eq!(editor_command(some(" "), some("nano")), "nano");
        assert_eq!(editor_command(None, some("hx")), "hx");

        let fallback = editor_command(None, Some(String::new()));
        assert!(fallback == "vi" || fallback == "notepad");
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
