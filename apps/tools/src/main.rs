use anyhow::Result;
use clap::{Parser, Subcommand};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/items.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace every item with the seed set.
    Seed,
    /// Remove every item and restart ids at 1.
    Clear,
    /// Print the stored items as JSON.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => {
            let seeded = storage.reseed().await?;
            println!("seeded {} items", seeded.len());
        }
        Command::Clear => {
            storage.clear().await?;
            println!("cleared items");
        }
        Command::List => {
            let items = storage.list_items().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    Ok(())
}
