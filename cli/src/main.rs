mod commands;
mod config;
mod logging;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    cmd_export, cmd_goal_clear, cmd_goal_set, cmd_goal_show, cmd_import, cmd_progress,
    cmd_user_add, cmd_weight_delete, cmd_weight_history, cmd_weight_log, cmd_weight_update,
    resolve_user,
};
use crate::config::Config;
use weighin_core::service::WeighinService;

#[derive(Parser)]
#[command(
    name = "weighin",
    version,
    about = "Track your weight and see how far you are from your goal"
)]
struct Cli {
    /// User to act as
    #[arg(short, long, global = true, env = "WEIGHIN_USER")]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Record and review weigh-ins
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage the target weight
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Show progress toward the goal (defaults to today)
    Progress {
        /// Date to evaluate as "today" (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export entries and goal as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Merge a JSON export into the selected user's data
    Import {
        /// Path to the export file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user (asks for the password without echo unless WEIGHIN_PASSWORD is set)
    Add {
        /// Login name
        username: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        #[arg(long, env = "WEIGHIN_PASSWORD", hide = true, hide_env_values = true)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change an existing entry
    Update {
        /// Weight entry ID
        id: i64,
        /// New weight value
        value: Option<f64>,
        /// Unit for the new value: kg or lbs (default: kg)
        #[arg(long, default_value = "kg")]
        unit: String,
        /// New date
        #[arg(long)]
        date: Option<String>,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
        /// Remove the notes
        #[arg(long)]
        clear_notes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history, newest first
    History {
        /// Show at most this many entries
        #[arg(short = 'n', long)]
        limit: Option<u32>,
        /// Only entries on or after this date
        #[arg(long)]
        start: Option<String>,
        /// Only entries on or before this date (default: today when --start is given)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weight entry by ID
    Delete {
        /// Weight entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set the target weight; paces not given are derived from the target date
    Set {
        /// Target weight
        target: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(long, default_value = "kg")]
        unit: String,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        by: Option<String>,
        /// Daily pace in grams
        #[arg(long)]
        daily: Option<f64>,
        /// Weekly pace in kg
        #[arg(long)]
        weekly: Option<f64>,
        /// Monthly pace in kg
        #[arg(long)]
        monthly: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current goal
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the goal
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    logging::init(default_level);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = WeighinService::new(&config.db_path)?;
    let user = cli.user.as_deref();

    match cli.command {
        Commands::Serve { port, bind } => server::start_server(svc, port, &bind).await,
        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                name,
                password,
                json,
            } => cmd_user_add(&svc, &username, name.as_deref(), password, json),
        },
        Commands::Weight { command } => {
            let user = resolve_user(&svc, user)?;
            match command {
                WeightCommands::Log {
                    value,
                    unit,
                    date,
                    notes,
                    json,
                } => cmd_weight_log(&svc, &user, value, &unit, date, notes, json),
                WeightCommands::Update {
                    id,
                    value,
                    unit,
                    date,
                    notes,
                    clear_notes,
                    json,
                } => cmd_weight_update(
                    &svc,
                    &user,
                    id,
                    value,
                    &unit,
                    date,
                    notes,
                    clear_notes,
                    json,
                ),
                WeightCommands::History {
                    limit,
                    start,
                    end,
                    json,
                } => cmd_weight_history(&svc, &user, limit, start, end, json),
                WeightCommands::Delete { id, json } => cmd_weight_delete(&svc, &user, id, json),
            }
        }
        Commands::Goal { command } => {
            let user = resolve_user(&svc, user)?;
            match command {
                GoalCommands::Set {
                    target,
                    unit,
                    by,
                    daily,
                    weekly,
                    monthly,
                    json,
                } => cmd_goal_set(
                    &svc, &user, target, &unit, by, daily, weekly, monthly, json,
                ),
                GoalCommands::Show { json } => cmd_goal_show(&svc, &user, json),
                GoalCommands::Clear { json } => cmd_goal_clear(&svc, &user, json),
            }
        }
        Commands::Progress { date, json } => {
            let user = resolve_user(&svc, user)?;
            cmd_progress(&svc, &user, date, json)
        }
        Commands::Export { output } => {
            let user = resolve_user(&svc, user)?;
            cmd_export(&svc, &user, output.as_deref())
        }
        Commands::Import { file, json } => {
            let user = resolve_user(&svc, user)?;
            cmd_import(&svc, &user, &file, json)
        }
    }
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
    fn test_user_flag_is_global() {
        let cli = Cli::try_parse_from(["weighin", "progress", "--user", "maria"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("maria"));
        let cli = Cli::try_parse_from(["weighin", "-u", "joao", "weight", "log", "80.5"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("joao"));
    }
}
