use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use campus_portal::api::{build_client, HttpPortalApi};
use campus_portal::auth::Authenticator;
use campus_portal::config::PortalConfig;
use campus_portal::dashboard::{local_today, DashboardAggregator, DashboardState};
use campus_portal::models::Identity;
use campus_portal::report;
use campus_portal::session::SessionStore;
use campus_portal::storage::FileStorage;

#[derive(Parser)]
#[command(name = "campus-portal")]
#[command(about = "Role-aware client for the campus portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Clear the persisted session
    Logout,
    /// Show the signed-in identity and its navigation
    Whoami,
    /// Load the dashboard for the signed-in identity
    Dashboard {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Keep the dashboard current as the session changes
    Watch,
}

type Aggregator = DashboardAggregator<HttpPortalApi>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PortalConfig::from_env_or_file()?;
    let storage = FileStorage::open(&config.state_dir)
        .with_context(|| format!("open session state in {}", config.state_dir.display()))?;
    let store = SessionStore::new(Arc::new(storage));
    let client = build_client(config.request_timeout)?;

    match cli.command {
        Commands::Login { email, password } => {
            let auth = Authenticator::new(client, &config.auth_base_url, store);
            match auth.login(&email, &password).await {
                Ok(identity) => println!("Signed in as {} ({}).", identity.email, identity.role.label()),
                Err(err) => anyhow::bail!("{}", err.user_message()),
            }
        }
        Commands::Logout => {
            let auth = Authenticator::new(client, &config.auth_base_url, store);
            auth.logout();
            println!("Signed out.");
        }
        Commands::Whoami => match store.get().identity {
            Some(identity) => print!("{}", report::build_profile(&identity)),
            None => println!("Not signed in."),
        },
        Commands::Dashboard { out } => {
            let identity = signed_in(&store)?;
            let api = HttpPortalApi::new(client, &config.api_base_url).with_session(store);
            let aggregator = DashboardAggregator::new(api);
            aggregator.refresh(Some(identity.clone())).await;
            let report = report::build_report(&identity, &aggregator.state(), local_today());
            match out {
                Some(out) => {
                    std::fs::write(&out, report)
                        .with_context(|| format!("write {}", out.display()))?;
                    println!("Dashboard written to {}.", out.display());
                }
                None => print!("{report}"),
            }
        }
        Commands::Watch => {
            let api =
                HttpPortalApi::new(client, &config.api_base_url).with_session(store.clone());
            let aggregator = Arc::new(DashboardAggregator::new(api));
            watch(&store, aggregator).await?;
        }
    }

    Ok(())
}

fn signed_in(store: &SessionStore) -> anyhow::Result<Identity> {
    store
        .get()
        .identity
        .context("not signed in; run `campus-portal login` first")
}

fn start_cycle(store: &SessionStore, aggregator: &Arc<Aggregator>) {
    let token = aggregator.activate(store.get().identity);
    let aggregator = Arc::clone(aggregator);
    tokio::spawn(async move {
        aggregator.run(token).await;
    });
}

async fn watch(store: &SessionStore, aggregator: Arc<Aggregator>) -> anyhow::Result<()> {
    let mut changes = store.subscribe();
    let mut states = aggregator.subscribe();
    start_cycle(store, &aggregator);

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else { break };
                tracing::info!(?change, "session changed");
                start_cycle(store, &aggregator);
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = states.borrow_and_update().clone();
                match (&snapshot.state, &snapshot.identity) {
                    (DashboardState::Idle, _) | (_, None) => println!("Not signed in."),
                    (DashboardState::Loading, Some(_)) => {}
                    (state, Some(identity)) => {
                        print!("{}", report::build_report(identity, state, local_today()));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
