use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use storage::{normalize_filter_name, NewFilter, Storage, StoredFilter};
use tracing_subscriber::EnvFilter;

/// Maintenance commands for the filter catalog database.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/photozone.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert the default filters into an empty catalog.
    Seed,
    /// Upsert the default filters, keeping usage counts.
    Sync,
    /// List filters, including inactive ones with `--all`.
    List {
        #[arg(long)]
        all: bool,
    },
    Create {
        name: String,
        display_name: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        sort_order: i64,
    },
    /// Most used filters first.
    #[command(alias = "stats")]
    Top {
        #[arg(long, default_value_t = 5)]
        limit: u32,
    },
    Delete {
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => {
            let seeded = storage.seed_default_filters().await?;
            println!("seeded {seeded} filters");
        }
        Command::Sync => {
            let report = storage.sync_default_filters().await?;
            println!("created {} / updated {}", report.created, report.updated);
        }
        Command::List { all } => {
            let filters = if all {
                storage.list_all_filters().await?
            } else {
                storage.list_active_filters().await?
            };
            filters.iter().for_each(print_filter);
        }
        Command::Create {
            name,
            display_name,
            icon,
            description,
            sort_order,
        } => {
            let name = normalize_filter_name(&name);
            if name.is_empty() || display_name.trim().is_empty() {
                bail!("name and display name are required");
            }
            let created = storage
                .create_filter(&NewFilter {
                    name,
                    display_name,
                    description,
                    background_image: None,
                    icon,
                    is_active: true,
                    sort_order,
                })
                .await?;
            println!("created filter id={}", created.id.0);
        }
        Command::Top { limit } => {
            storage
                .most_used_filters(limit)
                .await?
                .iter()
                .for_each(print_filter);
        }
        Command::Delete { name } => {
            if storage.delete_filter(&name).await? {
                println!("deleted {name}");
            } else {
                bail!("no filter named {name}");
            }
        }
    }

    Ok(())
}

fn print_filter(filter: &StoredFilter) {
    println!(
        "{:<10} {:<24} uses={:<5} order={}{}",
        filter.name,
        filter.display_name,
        filter.usage_count,
        filter.sort_order,
        if filter.is_active { "" } else { " (inactive)" }
    );
}
