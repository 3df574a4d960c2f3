//! CLI binary for nudge.

use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use nudge::background::{BackgroundTimerHost, HostConfig, HostSpawner};
use nudge::content::{PhraseBook, StylePicker};
use nudge::delivery::{
    ConfiguredPermission, DeliveryChannelSelector, DirectNotifier, Permission, TracingNotifier,
};
use nudge::last_fired::{FileLastFiredIndex, LastFiredStore};
use nudge::reminder::{JsonReminderStore, ReminderStore};
use nudge::{Clock, ForegroundScheduler, NotificationEvent, NudgeConfig, SystemClock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Nudge: habit reminders that fire on schedule.
#[derive(Parser)]
#[command(name = "nudge", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and an in-process timer host until Ctrl-C.
    Run,

    /// Validate stored reminders and show what each would do right now.
    Check,

    /// Send a test notification through the delivery chain.
    Notify {
        #[arg(long, default_value = "Nudge")]
        title: String,
        #[arg(long, default_value = "This is a test notification.")]
        body: String,
    },

    /// Ask for notification permission and remember the answer.
    Permit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);
    let _log_guard = init_tracing(matches!(command, Command::Run))?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(NudgeConfig::default_config_path);
    let config = NudgeConfig::load_or_default(&config_path)?;

    match command {
        Command::Run => run(config).await,
        Command::Check => check(&config).await,
        Command::Notify { title, body } => notify(&config, title, body).await,
        Command::Permit => permit(config, &config_path).await,
    }
}

/// Log to stderr; the daemon also keeps a daily rolling file.
fn init_tracing(
    to_file: bool,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nudge=info"));
    if !to_file {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
        return Ok(None);
    }

    let logs_dir = nudge::nudge_dirs::logs_dir();
    std::fs::create_dir_all(&logs_dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "nudge.log"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}

fn selector_for(config: &NudgeConfig, notifier: Arc<dyn DirectNotifier>) -> DeliveryChannelSelector {
    DeliveryChannelSelector::new(Arc::new(ConfiguredPermission::new(
        config.delivery.permission,
    )))
    .with_direct(notifier)
    .with_dismiss_after(config.auto_dismiss())
}

async fn run(config: NudgeConfig) -> anyhow::Result<()> {
    println!("nudge v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(JsonReminderStore::new(config.storage.reminders_path()));
    let last_fired = Arc::new(FileLastFiredIndex::open(config.storage.last_fired_path())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier: Arc<dyn DirectNotifier> = Arc::new(TracingNotifier::default());

    let host_config = HostConfig {
        horizon: config.handoff_horizon(),
        dismiss_after: config.auto_dismiss(),
    };
    let (host, host_task) =
        BackgroundTimerHost::spawn(Arc::clone(&notifier), Arc::clone(&clock), host_config);
    let resolver = HostSpawner::new(Arc::clone(&notifier), Arc::clone(&clock), host_config);

    let selector = selector_for(&config, Arc::clone(&notifier))
        .with_worker(host.clone())
        .with_resolver(Arc::new(resolver));

    let scheduler = ForegroundScheduler::builder(store, last_fired, Arc::new(selector))
        .with_clock(clock)
        .with_content(
            Arc::new(PhraseBook::default()),
            StylePicker::new(config.content.style, config.content.weights),
        )
        .with_hydration(config.hydration.to_reminder())
        .with_background(host.clone())
        .with_tick(config.tick())
        .with_handoff(
            config.scheduler.handoff_every_ticks,
            config.handoff_horizon(),
        )
        .build();

    if config.delivery.permission != Permission::Granted {
        println!(
            "Notification permission is '{}'; run `nudge permit` to enable delivery.",
            config.delivery.permission
        );
    }

    scheduler.start();
    println!("Scheduler running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    scheduler.stop();
    host.shutdown();
    host_task.await?;
    info!("nudge stopped");
    Ok(())
}

async fn check(config: &NudgeConfig) -> anyhow::Result<()> {
    let store = JsonReminderStore::new(config.storage.reminders_path());
    let last_fired = FileLastFiredIndex::open(config.storage.last_fired_path())?;
    let now = SystemClock.now();

    let mut reminders = store.list_reminders().await?;
    reminders.push(config.hydration.to_reminder());

    println!("{} reminder(s) at {}", reminders.len(), now.format("%a %H:%M"));
    for reminder in &reminders {
        let last = last_fired.get(&reminder.id)?;
        let decision = nudge::evaluate(reminder, &now, last);
        let next = nudge::upcoming_fires(reminder, now, last, ChronoDuration::hours(24))
            .first()
            .map(|at| at.format("%a %H:%M").to_string())
            .unwrap_or_else(|| "-".to_owned());
        println!(
            "  {:<24} {:<10} {}  decision={:?}  next={}",
            reminder.display_name(),
            reminder.frequency,
            reminder.active_window,
            decision,
            next
        );
    }
    Ok(())
}

async fn notify(config: &NudgeConfig, title: String, body: String) -> anyhow::Result<()> {
    let selector = selector_for(config, Arc::new(TracingNotifier::default()));
    let outcome = selector
        .deliver(&NotificationEvent::manual(title, body))
        .await;
    println!("Delivery outcome: {outcome:?}");
    Ok(())
}

async fn permit(mut config: NudgeConfig, config_path: &Path) -> anyhow::Result<()> {
    let selector = selector_for(&config, Arc::new(TracingNotifier::default()));
    let permission = selector.request_permission().await;
    if permission != config.delivery.permission {
        config.delivery.permission = permission;
        config.save_to_file(config_path)?;
        println!("Saved permission '{permission}' to {}", config_path.display());
    } else {
        println!("Permission is '{permission}'");
    }
    Ok(())
}
