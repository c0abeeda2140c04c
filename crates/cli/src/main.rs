use clap::Parser;
use config::Config;
use memtrack::cli::{Cli, Commands};
use memtrack::{app, headless};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::{debug, trace};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // load config
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/memtrack/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/memtrack/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?config, ?cli);

    match &cli.command {
        None | Some(Commands::Tui) => app::run(config).await,
        Some(Commands::List(args)) => headless::list(config, args).await,
        Some(Commands::Record(args)) => headless::record(config, args).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. For example, `MEMTRACK_LOG=warn memtrack -vvv list`
    // will still log at the trace level. The environment variable
    // (`MEMTRACK_LOG`) can only set the log level per crate, not override the
    // verbosity flag.
    let env_filter = EnvFilter::builder()
        .with_env_var("MEMTRACK_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    // The interactive front-end owns the terminal, so it only ever logs to a
    // file.
    let file_layer = match &cli.logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = (cli.logfile.is_none() && !cli.is_interactive()).then(|| {
        fmt::layer()
            .with_level(true)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(env_filter)
        .init();
    Ok(())
}
