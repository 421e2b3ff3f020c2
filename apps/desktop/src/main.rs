mod commands;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use client_core::{
    config::load_settings, ClientEvent, HttpItemResource, HttpStoreReseeder, ItemController,
    ItemPhase, ItemResource, ItemSlot, ItemView, ListController, StoreReseeder,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{ShellCommand, HELP};

#[derive(Parser, Debug)]
#[command(about = "Terminal front end for the optimistic item list")]
struct Args {
    /// Overrides `server_url` from client.toml / SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    delete_delay_ms: Option<u64>,
    /// Run without the reseed capability.
    #[arg(long)]
    no_reset: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(delay) = args.delete_delay_ms {
        settings.delete_delay_ms = delay;
    }
    if args.no_reset {
        settings.reset_enabled = false;
    }

    let resource: Arc<dyn ItemResource> = Arc::new(HttpItemResource::new(&settings.server_url)?);
    let reseeder: Option<Arc<dyn StoreReseeder>> = if settings.reset_enabled {
        Some(Arc::new(HttpStoreReseeder::new(&settings.server_url)?))
    } else {
        None
    };
    let list = ListController::new_with_dependencies(resource, reseeder, settings.delete_delay());

    let printer = tokio::spawn(print_events(list.subscribe_events()));

    println!("connected to {}", settings.server_url);
    if list.load().await.is_ok() {
        print_rows(&list).await;
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match ShellCommand::parse(&line) {
            Ok(command) => command,
            Err(error) => {
                println!("{error}");
                continue;
            }
        };
        if command == ShellCommand::Quit {
            break;
        }
        if let Err(error) = run(&list, command).await {
            println!("{error:#}");
        }
    }

    list.teardown().await;
    printer.abort();
    Ok(())
}

async fn run(list: &Arc<ListController>, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::List => print_rows(list).await,
        ShellCommand::Add => {
            let draft = list
                .start_draft()
                .await
                .ok_or_else(|| anyhow!("list is shut down"))?;
            let row = row_of(list, draft.slot()).await;
            println!("draft at row {row}; use `edit {row} <text>` then `commit {row}`");
        }
        ShellCommand::Edit { row, text } => {
            let controller = controller_at(list, row).await?;
            if !controller.edit(text).await {
                println!("row {row} is saving; try again once it settles");
            }
        }
        ShellCommand::Commit { row } => {
            let controller = controller_at(list, row).await?;
            // outcome and errors arrive through the event stream
            tokio::spawn(async move {
                match controller.commit().await {
                    Ok(outcome) => debug!(?outcome, "commit finished"),
                    Err(error) => debug!(%error, "commit failed"),
                }
            });
        }
        ShellCommand::Check { row, checked } => {
            let controller = controller_at(list, row).await?;
            if !controller.set_checked(checked).await {
                println!("row {row} cannot be checked right now");
            }
        }
        ShellCommand::Reset => {
            list.reset().await?;
            print_rows(list).await;
        }
        ShellCommand::Reload => {
            list.load().await?;
            print_rows(list).await;
        }
        ShellCommand::Help => println!("{HELP}"),
        ShellCommand::Quit => {}
    }
    Ok(())
}

async fn controller_at(list: &ListController, row: usize) -> Result<Arc<ItemController>> {
    let rows = list.rows().await;
    let view = rows
        .get(row)
        .ok_or_else(|| anyhow!("no row {row}; {} rows shown", rows.len()))?;
    let controller = match &view.slot {
        ItemSlot::Draft => list.draft().await,
        ItemSlot::Persisted(id) => list.item(id).await,
    };
    controller.ok_or_else(|| anyhow!("row {row} changed; run `list` again"))
}

async fn row_of(list: &ListController, slot: &ItemSlot) -> usize {
    list.rows()
        .await
        .iter()
        .position(|view| &view.slot == slot)
        .unwrap_or(0)
}

async fn print_rows(list: &ListController) {
    let rows = list.rows().await;
    if rows.is_empty() {
        println!("(no items)");
        return;
    }
    for (row, view) in rows.iter().enumerate() {
        println!("{row:>3} {}", render_row(view));
    }
}

fn render_row(view: &ItemView) -> String {
    let mark = match (view.checkable, view.marked_for_deletion) {
        (false, _) => "[+]",
        (true, true) => "[x]",
        (true, false) => "[ ]",
    };
    let id = slot_label(&view.slot);
    let status = match view.phase {
        ItemPhase::Saving => " (saving)",
        ItemPhase::Editing if view.committed.as_ref().map(|item| &item.text) != Some(&view.buffer) => {
            " (unsaved)"
        }
        _ => "",
    };
    let error = view
        .last_error
        .as_deref()
        .map(|message| format!(" ! {message}"))
        .unwrap_or_default();
    format!("{mark} {id:<5} {}{status}{error}", view.buffer)
}

fn slot_label(slot: &ItemSlot) -> String {
    match slot {
        ItemSlot::Draft => "new".to_string(),
        ItemSlot::Persisted(id) => format!("#{id}"),
    }
}

async fn print_events(mut events: tokio::sync::broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::CollectionChanged { ids }) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                println!("* items: [{}]", ids.join(", "));
            }
            Ok(ClientEvent::LoadStateChanged(state)) => debug!(?state, "load state"),
            Ok(ClientEvent::DraftChanged { present }) => debug!(present, "draft changed"),
            Ok(ClientEvent::ItemChanged { slot }) => debug!(?slot, "item changed"),
            Ok(ClientEvent::Error { slot, message }) => match slot {
                Some(slot) => println!("! {}: {message}", slot_label(&slot)),
                None => println!("! {message}"),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
