//! Point d'entrée CLI pour moped-geomigrate

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, RunArgs};

/// Migrer les features Moped vers les tables PostGIS typées
#[derive(Parser)]
#[command(name = "moped-geomigrate")]
#[command(author, version)]
#[command(about = "Migrer les features GeoJSON de moped_proj_features vers les tables PostGIS typées")]
#[command(long_about = "Vide les tables cibles puis migre chaque feature dans sa table (intersections, feux, segments, points et lignes dessinés), avec liaison au composant de projet.\n\nUtilisez 'inspect' pour vérifier le routage d'une feature sans base de données.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: migration)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments de la migration (commande par défaut)
    #[command(flatten)]
    run: RunArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Inspect {
            path,
            component,
            subtype,
            table,
            feature_id,
            config,
            signal_exceptions,
        }) => {
            info!(path = %path.display(), component = %component, "Inspecting feature");
            cli::cmd_inspect(
                &path,
                &component,
                subtype.as_deref(),
                table.as_deref(),
                feature_id,
                &config,
                &signal_exceptions,
            )?;
        }
        None => {
            cli::cmd_run(cli.run).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
