use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use pktwarden::config::Config;
use pktwarden::core::Payload;
use pktwarden::http_validator::{HttpValidator, ValidationResult};
use pktwarden::Inspector;

#[derive(Parser)]
#[command(name = "pktwarden")]
#[command(author, version, about = "Automaton-based deep packet inspection toolkit")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a payload against the configured pattern set
    Scan {
        /// Payload text (or hex string with --hex)
        payload: String,

        /// Treat the payload argument as a hex string
        #[arg(long)]
        hex: bool,

        /// Print the per-byte automaton step trace
        #[arg(long)]
        steps: bool,

        /// Use the streaming prefix-table scanner instead of the
        /// multi-pattern automaton
        #[arg(long)]
        prefix: bool,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Validate the structure of an HTTP request message
    Validate {
        /// Message text; \r\n escapes are expanded
        message: Option<String>,

        /// Read the message from a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the full transition trace
        #[arg(long)]
        trace: bool,
    },

    /// Dump automaton structure as JSON
    Export {
        /// Which automaton to dump (trie, dfa)
        #[arg(default_value = "trie")]
        target: String,
    },

    /// List the configured pattern categories
    Patterns,
}

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Position")]
    position: usize,
}

#[derive(Tabled)]
struct PatternRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Patterns")]
    patterns: String,
}

pub fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Scan {
            payload,
            hex,
            steps,
            prefix,
            format,
        } => cmd_scan(config, &payload, hex, steps, prefix, &format),
        Commands::Validate {
            message,
            file,
            trace,
        } => cmd_validate(message, file, trace),
        Commands::Export { target } => cmd_export(config, &target),
        Commands::Patterns => cmd_patterns(config),
    }
}

fn cmd_scan(
    config: Config,
    payload: &str,
    hex: bool,
    steps: bool,
    prefix: bool,
    format: &str,
) -> Result<()> {
    let payload = if hex {
        Payload::from_hex(payload).context("Failed to decode hex payload")?
    } else {
        Payload::from(payload)
    };

    let inspector = Inspector::new(config);

    if prefix {
        let hits = inspector.scan_prefix(&payload);
        if hits.is_empty() {
            println!("{}", "clean".green());
        } else {
            for hit in hits {
                println!(
                    "{} {} at byte {}",
                    "match".red().bold(),
                    hit.patterns.join(", "),
                    hit.position
                );
            }
        }
        return Ok(());
    }

    let report = inspector.scan(0, &payload);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("payload: {}", report.payload_ascii);
    println!("hex:     {}", report.payload_hex);

    if report.is_clean() {
        println!("{}", "clean".green());
    } else {
        let rows: Vec<MatchRow> = report
            .matches
            .iter()
            .map(|m| MatchRow {
                pattern: m.pattern.clone(),
                position: m.position,
            })
            .collect();
        println!("{}", Table::new(rows));
    }

    if steps {
        for (i, step) in report.steps.iter().enumerate() {
            let outputs = if step.outputs.is_empty() {
                String::new()
            } else {
                format!("  -> {}", step.outputs.join(", ").red())
            };
            println!(
                "{:4}  {:<4} node {}{}",
                i,
                render_byte(step.byte),
                step.node,
                outputs
            );
        }
    }

    Ok(())
}

fn cmd_validate(message: Option<String>, file: Option<PathBuf>, trace: bool) -> Result<()> {
    let message = match (message, file) {
        (_, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read message file: {}", path.display()))?,
        (Some(text), None) => text.replace("\\r", "\r").replace("\\n", "\n"),
        (None, None) => anyhow::bail!("Provide a message argument or --file"),
    };

    let mut validator = HttpValidator::new();
    let result = validator.validate(&message);

    let verdict = match result {
        ValidationResult::Valid => "valid".green().bold(),
        ValidationResult::Invalid => "invalid".red().bold(),
        ValidationResult::Incomplete => "incomplete".yellow().bold(),
    };
    println!("{}", verdict);

    if trace {
        for record in validator.trace() {
            let input = match record.input {
                Some('\r') => "\\r".to_string(),
                Some('\n') => "\\n".to_string(),
                Some(c) => c.to_string(),
                None => "ε".to_string(),
            };
            println!(
                "{:<16} {:<3} [{}] {}",
                record.state.to_string(),
                input,
                record.stack_top,
                record.action
            );
        }
    }

    Ok(())
}

fn cmd_export(config: Config, target: &str) -> Result<()> {
    let inspector = Inspector::new(config);

    match target {
        "trie" => println!("{}", serde_json::to_string_pretty(&inspector.trie_dump())?),
        "dfa" => println!("{}", serde_json::to_string_pretty(&inspector.dfa_dump())?),
        other => anyhow::bail!("Unknown export target: {} (expected trie or dfa)", other),
    }

    Ok(())
}

fn cmd_patterns(config: Config) -> Result<()> {
    let rows: Vec<PatternRow> = config
        .patterns
        .iter()
        .map(|(category, patterns)| PatternRow {
            category: category.clone(),
            patterns: patterns.join(", "),
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

fn render_byte(byte: u8) -> String {
    if byte.is_ascii_graphic() || byte == b' ' {
        (byte as char).to_string()
    } else {
        format!("\\x{:02x}", byte)
    }
}
