//! workq CLI: operator interface to the queue tables.

use std::time::Duration;

use clap::{Parser, Subcommand};
use workq::config::Config;
use workq::config::secrets::ExposeSecret;
use workq::db::{Db, Queue, QueueName};
use workq::model::{ItemId, NewItem, QueueItem};
use workq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "workq", about = "Durable Postgres work queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending migrations (creates the task and event queues)
    Migrate,
    /// Queue table administration
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Enqueue a new item
    Enqueue {
        /// Queue name
        queue: QueueName,
        /// Item type (selects the handler)
        item_type: String,
        /// Item ID (defaults to a fresh UUID)
        #[arg(long)]
        id: Option<ItemId>,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
        /// Retries allowed after the first attempt
        #[arg(long, default_value_t = workq::model::DEFAULT_MAX_RETRIES)]
        max_retries: u32,
        /// Lease length in seconds
        #[arg(long, default_value_t = workq::model::DEFAULT_VISIBILITY_TIMEOUT_SECS)]
        visibility_timeout: u32,
        /// Delay before the item becomes claimable
        #[arg(long, default_value_t = 0)]
        delay_secs: u64,
    },
    /// List items of one type, newest first
    List {
        queue: QueueName,
        item_type: String,
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one item
    Show { queue: QueueName, id: ItemId },
    /// Item counts per status
    Stats { queue: QueueName },
    /// Dead-letter items whose final lease expired
    Reap { queue: QueueName },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Create a queue table (idempotent)
    Create { name: QueueName },
    /// Drop a queue table and all of its items
    Drop { name: QueueName },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig::from_config(&config, "workq"))?;

    let db = Db::connect_with(config.database_url.expose_secret(), config.max_connections).await?;

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            println!("Migrations applied.");
        }
        Command::Queue { action } => match action {
            QueueAction::Create { name } => {
                db.create_queue(&name).await?;
                println!("Queue {name} ready.");
            }
            QueueAction::Drop { name } => {
                db.drop_queue(&name).await?;
                println!("Queue {name} dropped.");
            }
        },
        Command::Enqueue {
            queue,
            item_type,
            id,
            payload,
            max_retries,
            visibility_timeout,
            delay_secs,
        } => {
            let payload: serde_json::Value = match payload {
                Some(json) => serde_json::from_str(&json)?,
                None => serde_json::json!({}),
            };
            let new = NewItem::new(id.unwrap_or_default(), item_type)
                .payload(payload)
                .max_retries(max_retries)
                .visibility_timeout_secs(visibility_timeout)
                .delay(Duration::from_secs(delay_secs));

            match db.queue(queue).enqueue(new).await {
                Ok(item) => println!("Enqueued: {} (visible at {})", item.id, item.visible_at),
                Err(workq::error::Error::DuplicateId(id)) => println!("Already enqueued: {id}"),
                Err(e) => return Err(e.into()),
            }
        }
        Command::List {
            queue,
            item_type,
            limit,
        } => cmd_list(&db.queue(queue), &item_type, limit).await?,
        Command::Show { queue, id } => {
            let item = db.queue(queue).get(id).await?;
            print_item(&item)?;
        }
        Command::Stats { queue } => {
            let stats = db.queue(queue.clone()).stats().await?;
            println!("Queue:       {queue}");
            println!("Pending:     {}", stats.pending);
            println!("Processing:  {}", stats.processing);
            println!("Completed:   {}", stats.completed);
            println!("Dead:        {}", stats.dead);
            println!("Total:       {}", stats.total());
        }
        Command::Reap { queue } => {
            let reaped = db.queue(queue).reap_exhausted().await?;
            println!("Dead-lettered {reaped} item(s).");
        }
    }

    Ok(())
}

async fn cmd_list(queue: &Queue, item_type: &str, limit: u32) -> anyhow::Result<()> {
    let items = queue.list_by_type(item_type, limit).await?;

    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<10}  {:<7}  {:<24}  CREATED",
        "ID", "STATUS", "TRIES", "WORKER"
    );
    println!("{}", "-".repeat(100));

    for item in &items {
        let worker = item.worker_id.as_ref().map(|w| w.as_str()).unwrap_or("-");
        let worker_display = worker.get(..24).unwrap_or(worker);
        println!(
            "{:<36}  {:<10}  {:<7}  {:<24}  {}",
            item.id,
            item.status,
            format!("{}/{}", item.retry_count, item.max_retries + 1),
            worker_display,
            item.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!("\n{} item(s)", items.len());
    Ok(())
}

fn print_item(item: &QueueItem) -> anyhow::Result<()> {
    println!("ID:           {}", item.id);
    println!("Type:         {}", item.item_type);
    println!("Status:       {}", item.status);
    println!("Payload:      {}", serde_json::to_string_pretty(&item.payload)?);
    println!("Retry Count:  {}", item.retry_count);
    println!("Max Retries:  {}", item.max_retries);
    println!("Lease:        {}s", item.visibility_timeout_secs);
    println!("Visible At:   {}", item.visible_at);
    if let Some(ref worker) = item.worker_id {
        println!("Worker:       {worker}");
    }
    if let Some(started) = item.started_at {
        println!("Started:      {started}");
    }
    if let Some(completed) = item.completed_at {
        println!("Completed:    {completed}");
    }
    if let Some(failed) = item.failed_at {
        println!("Failed:       {failed}");
    }
    if let Some(ref err) = item.error_message {
        println!("Error:        {err}");
    }
    println!("Created:      {}", item.created_at);
    println!("Updated:      {}", item.updated_at);
    Ok(())
}
