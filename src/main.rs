mod commands;
mod core;
mod detect;
mod graph;
mod manifest;
mod publish;
mod registry;
mod ui;
mod vcs;

use clap::{Parser, Subcommand};
use crate::core::error::{FlotillaError, print_error};

/// Publish npm monorepo packages in dependency order
#[derive(Parser)]
#[command(name = "flotilla")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  /// Workspace root (default: current directory)
  #[arg(long, global = true)]
  root: Option<std::path::PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Detect changed packages and publish them (and their dependents) in
  /// dependency-ordered batches
  Publish {
    /// Run shape: single (root is the package), monorepo-single
    /// (one package out of a workspace), workspace (everything)
    #[arg(long, default_value = "workspace")]
    route: String,
    /// Version bump level on the main branch: major, minor, patch
    #[arg(long, default_value = "patch")]
    bump: String,
    /// Distribution tag (default: from flotilla.toml, then "latest")
    #[arg(long)]
    tag: Option<String>,
    /// Access level for every published package: public, restricted
    #[arg(long)]
    access: Option<String>,
    /// Branch treated as the stable release line
    #[arg(long)]
    main_branch: Option<String>,
    /// Branch treated as the prerelease line
    #[arg(long)]
    dev_branch: Option<String>,
    /// Target package for the monorepo-single route
    #[arg(long, short)]
    package: Option<String>,
    /// Skip change detection and treat every package as changed
    #[arg(long)]
    force: bool,
    /// Compute the full plan and versions without writing or publishing
    #[arg(long)]
    dry_run: bool,
    /// Output the outcome in JSON format
    #[arg(long)]
    json: bool,
    /// Ceiling on the change-detection phase, in seconds
    #[arg(long)]
    detect_timeout: Option<u64>,
    /// Command run in each package directory before detection and publish
    /// (default: from flotilla.toml)
    #[arg(long)]
    build_command: Option<String>,
  },

  /// Show which packages are affected by a git range
  Affected {
    /// Git ref to compare against (default: origin/main)
    #[arg(long, default_value = "origin/main")]
    since: String,
    /// Start ref (for SHA pair mode)
    #[arg(long, conflicts_with = "since")]
    from: Option<String>,
    /// End ref (for SHA pair mode)
    #[arg(long, requires = "from")]
    to: Option<String>,
    /// Output format: text (default), json, names-only
    #[arg(long, default_value = "text")]
    format: String,
  },

  /// Write a starter flotilla.toml
  Init {
    /// Overwrite an existing configuration file
    #[arg(long)]
    force: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let cli = Cli::parse();

  let root = match &cli.root {
    Some(root) => root.clone(),
    None => match std::env::current_dir() {
      Ok(dir) => dir,
      Err(e) => {
        eprintln!("❌ Error: failed to get current directory: {}", e);
        std::process::exit(1);
      }
    },
  };

  // init runs before any context exists
  if let Commands::Init { force } = &cli.command {
    if let Err(err) = commands::run_init(&root, *force) {
      handle_error(err);
    }
    return;
  }

  let ctx = match crate::core::context::RunContext::build(&root) {
    Ok(ctx) => ctx,
    Err(err) => handle_error(err),
  };

  let result = match cli.command {
    Commands::Publish {
      route,
      bump,
      tag,
      access,
      main_branch,
      dev_branch,
      package,
      force,
      dry_run,
      json,
      detect_timeout,
      build_command,
    } => commands::run_publish(
      &ctx,
      route,
      bump,
      tag,
      access,
      main_branch,
      dev_branch,
      package,
      force,
      dry_run,
      json,
      detect_timeout,
      build_command,
    ),
    Commands::Affected {
      since,
      from,
      to,
      format,
    } => commands::run_affected(&ctx, since, from, to, format),
    Commands::Init { .. } => unreachable!("handled above"),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: FlotillaError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code());
}
