mod config;
mod control;
mod error;
mod eviction;
mod fetch;
mod lifecycle;
mod policy;
mod store;
mod strategy;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

use config::Config;
use control::ControlChannel;
use fetch::{Destination, Method, NetworkClient, Request, RequestMode};
use store::{MemoryStore, PartitionStore, SqliteStore};
use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "cachefront")]
#[command(about = "Offline-first caching front: serve from cache, network, or both")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/cachefront/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep the cache in memory instead of on disk
  #[arg(long)]
  memory: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the current version: populate the precache, then activate
  Warm,
  /// Run one request through the strategy dispatcher and print the body
  Get {
    /// Absolute URL, or a path resolved against the configured origin
    url: String,

    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigate: bool,

    /// Mark the request destination as an image
    #[arg(long)]
    image: bool,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Force-activate the current version now (SKIP_WAITING)
  Activate,
  /// Delete every cache partition regardless of version (PURGE_CACHES)
  Purge,
  /// List cache partitions with entry counts and newest entry time
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(writer)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let network = Arc::new(NetworkClient::new()?);

  if args.memory {
    run(Arc::new(MemoryStore::new()), network, &config, args.command).await
  } else {
    let store = match &config.cache_path {
      Some(path) => SqliteStore::open_at(path)?,
      None => SqliteStore::open()?,
    };
    run(Arc::new(store), network, &config, args.command).await
  }
}

async fn run<S: PartitionStore + 'static>(
  store: Arc<S>,
  network: Arc<NetworkClient>,
  config: &Config,
  command: Command,
) -> Result<()> {
  let mut worker = Worker::new(Arc::clone(&store), network, config)?;

  match command {
    Command::Warm => {
      worker.install_and_activate().await?;
      println!("precache populated, version {} active", config.version);
    }

    Command::Get {
      url,
      navigate,
      image,
      method,
    } => {
      let request = build_request(config, &url, navigate, image, &method)?;
      let response = worker.handle(&request, None).await?;

      eprintln!("{} {}", response.status, request.url);
      std::io::stdout().write_all(&response.body)?;
    }

    Command::Activate => {
      drain_control(&mut worker, control::SKIP_WAITING).await?;
      println!("version {} activated", config.version);
    }

    Command::Purge => {
      drain_control(&mut worker, control::PURGE_CACHES).await?;
      println!("all cache partitions purged");
    }

    Command::Status => {
      let names = store.list_partitions()?;
      if names.is_empty() {
        println!("no cache partitions");
      }
      for name in names {
        let count = store.list_keys(&name)?.len();
        match store::newest_stored_at(store.as_ref(), &name)? {
          Some(at) => println!(
            "{}: {} entries, newest {}",
            name,
            count,
            at.format("%Y-%m-%d %H:%M:%S")
          ),
          None => println!("{}: {} entries", name, count),
        }
      }
    }
  }

  Ok(())
}

/// Post one wire message on the control channel and apply whatever arrives.
async fn drain_control<S, N>(worker: &mut Worker<S, N>, raw: &str) -> Result<()>
where
  S: PartitionStore + 'static,
  N: fetch::Fetch + 'static,
{
  let (handle, mut channel) = ControlChannel::new();
  handle.post(raw);
  drop(handle);

  while let Some(message) = channel.next().await {
    worker.on_message(message).await?;
  }
  Ok(())
}

fn build_request(
  config: &Config,
  url: &str,
  navigate: bool,
  image: bool,
  method: &str,
) -> Result<Request> {
  let url = if url.starts_with('/') {
    config.origin_url()?.join(url)?
  } else {
    Url::parse(url)?
  };

  let method: Method = method
    .parse()
    .map_err(|e: String| color_eyre::eyre::eyre!(e))?;

  let mut request = Request::get(url).with_method(method);
  if navigate {
    request = request
      .with_mode(RequestMode::Navigate)
      .with_destination(Destination::Document);
  } else if image {
    request = request.with_destination(Destination::Image);
  }

  Ok(request)
}
