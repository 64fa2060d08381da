use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use contentflow::clipboard::Clipboard;
use contentflow::config;
use contentflow::db::SqliteKv;
use contentflow::filter::{self, HistoryQuery, PlatformFilter, StatusFilter};
use contentflow::gateway::HttpAgentGateway;
use contentflow::model::{join_platforms, BatchId, ContentBatch, Platform, PlatformSet};
use contentflow::notify::NotificationKind;
use contentflow::pipeline::PipelineController;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate, review and schedule social media content")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Research trends and draft scripts for a topic
    Generate {
        #[arg(long)]
        topic: String,
        /// Target platform; repeat for several. Defaults to the saved defaults
        #[arg(long = "platform")]
        platforms: Vec<Platform>,
        /// Brand voice for this run only
        #[arg(long)]
        voice: Option<String>,
    },
    /// Send a batch to the scheduling agent
    Schedule {
        #[arg(long)]
        id: BatchId,
        /// Defaults to every platform of the batch that has a script
        #[arg(long = "platform")]
        platforms: Vec<Platform>,
    },
    /// Replace one platform's script
    Edit {
        #[arg(long)]
        id: BatchId,
        #[arg(long)]
        platform: Platform,
        /// New content; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
    },
    /// Print one script's raw content
    Copy {
        #[arg(long)]
        id: BatchId,
        #[arg(long)]
        platform: Platform,
    },
    /// Show one batch in full
    Show {
        #[arg(long)]
        id: BatchId,
    },
    /// List history, newest first
    History {
        #[arg(long, default_value = "all")]
        status: StatusFilter,
        #[arg(long, default_value = "all")]
        platform: PlatformFilter,
        /// First day (YYYY-MM-DD, UTC), inclusive
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day (YYYY-MM-DD, UTC), inclusive
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Delete a batch from history
    Delete {
        #[arg(long)]
        id: BatchId,
    },
    /// Show or change saved preferences
    Settings {
        /// Default platforms, comma separated
        #[arg(long, value_delimiter = ',')]
        platforms: Option<Vec<Platform>>,
        #[arg(long)]
        voice: Option<String>,
    },
    /// Print an example configuration
    ExampleConfig,
}

struct StdoutClipboard;

impl Clipboard for StdoutClipboard {
    fn copy(&self, text: &str) -> bool {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{text}").is_ok()
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(ExitCode::SUCCESS);
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.app.database_url());
    let kv = SqliteKv::connect(&database_url).await?;
    let gateway = HttpAgentGateway::from_config(&cfg.agents)?;
    let controller = PipelineController::open(&cfg, Arc::new(kv), Arc::new(gateway)).await;
    info!(database = %database_url, "pipeline ready");

    let result = run(&controller, args.command).await;
    for n in controller.notifications().drain() {
        match n.kind {
            NotificationKind::Success => println!("[ok] {}", n.message),
            NotificationKind::Error => eprintln!("[error] {}", n.message),
        }
    }
    // Pipeline failures were already reported through the notifications.
    Ok(if result? {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Runs one command. `Ok(false)` means the pipeline rejected or failed it.
async fn run(controller: &PipelineController, command: Command) -> Result<bool> {
    match command {
        Command::Generate {
            topic,
            platforms,
            voice,
        } => {
            let platforms = if platforms.is_empty() {
                controller.settings().default_platforms()
            } else {
                platforms.into_iter().collect()
            };
            let Ok(outcome) = controller
                .generate(&topic, &platforms, voice.as_deref())
                .await
            else {
                return Ok(false);
            };
            if let Some(batch) = controller.history().get(&outcome.batch_id).await {
                print_batch(&batch);
            }
        }
        Command::Schedule { id, platforms } => {
            let platforms: PlatformSet = if platforms.is_empty() {
                controller
                    .history()
                    .get(&id)
                    .await
                    .map(|b| b.eligible_platforms())
                    .unwrap_or_default()
            } else {
                platforms.into_iter().collect()
            };
            let Ok(outcome) = controller.schedule(&id, &platforms).await else {
                return Ok(false);
            };
            for row in &outcome.posting_outcomes {
                println!(
                    "  {:<10} {:<8} {}{}",
                    row.platform,
                    row.status.as_str(),
                    row.message,
                    row.post_url
                        .as_deref()
                        .map(|u| format!(" ({u})"))
                        .unwrap_or_default()
                );
            }
            if let Some(status) = outcome.status {
                println!("status: {status}");
            }
        }
        Command::Edit {
            id,
            platform,
            content,
        } => {
            let content = match content {
                Some(c) => c,
                None => std::io::read_to_string(std::io::stdin())
                    .context("failed to read content from stdin")?,
            };
            if controller.edit_script(&id, platform, &content).await.is_err() {
                return Ok(false);
            }
            println!("{platform} script updated");
        }
        Command::Copy { id, platform } => {
            if !controller
                .copy_script(&id, platform, &StdoutClipboard)
                .await?
            {
                return Err(anyhow!("failed to write script"));
            }
        }
        Command::Show { id } => {
            let batch = controller
                .history()
                .get(&id)
                .await
                .ok_or_else(|| anyhow!("no batch with id {id}"))?;
            print_batch(&batch);
        }
        Command::History {
            status,
            platform,
            from,
            to,
        } => {
            let query = HistoryQuery {
                status,
                platform,
                date_from: from,
                date_to: to,
            };
            let entries = controller.history().all().await;
            let matched = filter::filter(&entries, &query);
            if matched.is_empty() {
                println!("no matching batches");
            }
            for batch in matched {
                println!(
                    "{}  {}  {:<9}  {}  [{}]",
                    batch.id(),
                    batch.created_at().format("%Y-%m-%d %H:%M"),
                    batch.status(),
                    batch.topic(),
                    join_platforms(batch.platforms())
                );
            }
        }
        Command::Delete { id } => {
            if controller.delete(&id).await {
                println!("deleted {id}");
            } else {
                println!("no batch with id {id}");
            }
        }
        Command::Settings { platforms, voice } => {
            let settings = controller.settings();
            if let Some(platforms) = platforms {
                settings
                    .save_default_platforms(platforms.into_iter().collect())
                    .await;
            }
            if let Some(voice) = voice {
                settings.save_brand_voice(&voice).await;
            }
            println!(
                "default platforms: {}",
                join_platforms(&settings.default_platforms())
            );
            println!("brand voice: {}", settings.brand_voice());
        }
        Command::ExampleConfig => print!("{}", config::example()),
    }
    Ok(true)
}

fn print_batch(batch: &ContentBatch) {
    println!("id:        {}", batch.id());
    println!("created:   {}", batch.created_at().to_rfc3339());
    println!("topic:     {}", batch.topic());
    println!("platforms: {}", join_platforms(batch.platforms()));
    println!("status:    {}", batch.status());
    if let Some(insights) = batch.trend_insights() {
        println!("\ntrends: {}", insights.summary);
        for trend in &insights.trends {
            println!("  - {}", trend.topic);
        }
    }
    for (platform, script) in batch.scripts().iter() {
        println!("\n== {platform} ({}) ==", script.format);
        println!("{}", script.content);
        if !script.hashtags.is_empty() {
            println!("{}", script.hashtags.join(" "));
        }
    }
    if let Some(summary) = batch.posting_summary() {
        println!("\nposting: {summary}");
    }
}
