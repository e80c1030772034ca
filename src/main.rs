mod cache;
mod config;
mod event;
mod fetch;
mod lifecycle;
mod notification;
mod router;
mod strategy;
#[cfg(test)]
mod testing;
mod types;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::cache::{CacheSource, CacheStorage, SqliteStorage};
use crate::event::{Dispatcher, Event, EventOutcome, Worker};
use crate::fetch::HttpFetcher;
use crate::notification::Notification;
use crate::types::Request;

#[derive(Parser, Debug)]
#[command(name = "offline-proxy")]
#[command(about = "Offline-first request cache with versioned namespaces")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-proxy/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create the namespaces and preload the static assets
  Install,
  /// Drop stale namespaces and start serving from the cache
  Activate,
  /// Request a resource through the cache
  Fetch {
    /// Absolute URL, or a path relative to the configured origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Extra request header, as `name: value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Write the body here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List namespaces and their entry counts
  Namespaces,
  /// Build the notification for a push payload
  Push {
    /// JSON payload ({"title", "body", "url"})
    payload: Option<String>,
  },
  /// Resolve a notification action
  Click {
    action: String,
    /// Page the notification points at (default: the alerts page)
    #[arg(long)]
    url: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(config.log_file.as_deref())?;

  let storage = SqliteStorage::open(config.cache_path.as_deref())?;
  let fetcher = HttpFetcher::new(&config.network)?;
  let worker = Worker::new(&config, storage, fetcher)?;

  match args.command {
    Command::Namespaces => list_namespaces(&worker),
    Command::Fetch {
      url,
      method,
      headers,
      output,
    } => {
      let mut request = Request::parse(&method, &url, &config.origin_url()?)?;
      for header in headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Invalid header '{}', expected 'name: value'", header))?;
        request = request.with_header(name.trim(), value.trim());
      }

      let dispatcher = Dispatcher::spawn(worker);
      let outcome = dispatcher.send(Event::Intercept(request)).await?;
      print_outcome(outcome, output.as_deref())
    }
    Command::Install => {
      let dispatcher = Dispatcher::spawn(worker);
      print_outcome(dispatcher.send(Event::Install).await?, None)
    }
    Command::Activate => {
      let dispatcher = Dispatcher::spawn(worker);
      print_outcome(dispatcher.send(Event::Activate).await?, None)
    }
    Command::Push { payload } => {
      let dispatcher = Dispatcher::spawn(worker);
      let event = Event::PushReceived(payload.map(String::into_bytes));
      print_outcome(dispatcher.send(event).await?, None)
    }
    Command::Click { action, url } => {
      let mut notification = Notification::from_push(None);
      if let Some(url) = url {
        notification.data.url = url;
      }
      let dispatcher = Dispatcher::spawn(worker);
      let event = Event::NotificationAction {
        action,
        notification,
      };
      print_outcome(dispatcher.send(event).await?, None)
    }
  }
}

/// Log to `log_file` when configured, stderr otherwise. RUST_LOG filters.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

fn list_namespaces<S: CacheStorage, F: fetch::Fetch>(worker: &Worker<S, F>) -> Result<()> {
  let namespaces = worker.namespaces();
  println!("state: {:?}", worker.state());
  for id in namespaces.namespace_ids()? {
    let count = namespaces.handle(&id).len()?;
    println!("{}\t{} entries", id, count);
  }
  Ok(())
}

fn print_outcome(outcome: EventOutcome, output: Option<&Path>) -> Result<()> {
  match outcome {
    EventOutcome::Installed(report) => {
      println!("cached {} assets", report.cached.len());
      for (url, reason) in report.failed {
        println!("  not cached: {} ({})", url, reason);
      }
    }
    EventOutcome::Activated(report) => {
      println!("deleted {} stale namespaces", report.deleted.len());
      for (id, reason) in report.failed {
        println!("  not deleted: {} ({})", id, reason);
      }
    }
    EventOutcome::Response(served) => {
      let served = served?;
      let source = match served.source {
        CacheSource::Network => "network",
        CacheSource::Cache => "cache",
        CacheSource::Synthetic => "synthetic",
      };
      match served.cached_at {
        Some(at) => eprintln!(
          "{} ({}, {} bytes, cached {})",
          served.data.status,
          source,
          served.data.body.len(),
          at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => eprintln!("{} ({}, {} bytes)", served.data.status, source, served.data.body.len()),
      }

      match output {
        Some(path) => std::fs::write(path, &served.data.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
        None => std::io::stdout().write_all(&served.data.body)?,
      }
    }
    EventOutcome::ShowNotification(notification) => {
      println!("{}", serde_json::to_string_pretty(&notification)?);
    }
    EventOutcome::OpenWindow(url) => println!("open {}", url),
    EventOutcome::Dismissed => println!("dismissed"),
  }
  Ok(())
}
