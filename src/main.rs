use std::path::PathBuf;

use clap::{Parser, Subcommand};
use menusync::{Result, cmd, config::Config, types::Source};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the menusync application
#[derive(Parser)]
#[command(name = "menusync")]
#[command(about = "Synchronize restaurant menus from external sources")]
#[command(version)]
struct Cli {
   #[arg(long, env = "MENUSYNC_CONFIG", help = "Config file (default: ~/.menusync/config.toml)")]
   config: Option<PathBuf>,

   #[arg(long, env = "MENUSYNC_TOKEN", hide_env_values = true, help = "Trigger bearer token")]
   token: Option<String>,

   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for menusync
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Sync one restaurant's menu")]
   Sync {
      #[arg(help = "Restaurant id")]
      restaurant_id: String,

      #[arg(short, long, value_enum, help = "Only sync this source")]
      source: Option<Source>,

      #[arg(short, long, help = "Ignore the sync interval")]
      force: bool,

      #[arg(long, help = "Print the result as JSON")]
      json: bool,
   },

   #[command(name = "sync-all", about = "Sync every enabled configuration")]
   SyncAll {
      #[arg(short, long, help = "Ignore the sync interval")]
      force: bool,

      #[arg(long, help = "Print results as JSON")]
      json: bool,
   },

   #[command(about = "Show configurations and recent sync runs")]
   Status {
      #[arg(short, long, help = "Only show this restaurant")]
      restaurant: Option<String>,

      #[arg(short = 'n', long, default_value = "20", help = "Number of recent runs")]
      limit: usize,

      #[arg(long, help = "Print status as JSON")]
      json: bool,
   },

   #[command(about = "Stamp missing external ids on synced items")]
   Backfill {
      #[arg(help = "Restaurant id")]
      restaurant_id: String,

      #[arg(short, long, value_enum, help = "Source whose items to backfill")]
      source: Source,
   },
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      eprintln!("{err}");
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   let cfg = match &cli.config {
      Some(path) => Config::load_from(path)?,
      None => Config::load()?,
   };
   let token = cli.token.as_deref();

   match cli.command {
      Cmd::Sync { restaurant_id, source, force, json } => {
         cmd::sync::execute(&cfg, token, restaurant_id, source, force, json).await
      },
      Cmd::SyncAll { force, json } => cmd::sync::execute_all(&cfg, token, force, json).await,
      Cmd::Status { restaurant, limit, json } => {
         cmd::status::execute(&cfg, restaurant, limit, json).await
      },
      Cmd::Backfill { restaurant_id, source } => {
         cmd::backfill::execute(&cfg, token, restaurant_id, source).await
      },
   }
}
