use facet::Facet;
use figue as args;
use std::num::NonZeroUsize;
use std::sync::Arc;

use rwtrace::{CaptureOptions, LoggingRwLock, TraceOptions, TracingSink};

mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::named, default)]
    confirm: bool,
    #[facet(args::named, default)]
    max_frames: Option<usize>,
    #[facet(args::named, default)]
    via_tracing: bool,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    ExclusiveRoundTrip,
    SharedReaders,
    LockOrderInversion,
}

/// How every lock built by a scenario is configured.
#[derive(Debug, Clone, Copy)]
pub struct LockFactory {
    options: TraceOptions,
    via_tracing: bool,
}

impl LockFactory {
    pub fn build(&self, label: &str) -> LoggingRwLock {
        let lock = LoggingRwLock::named(label).with_options(self.options);
        if self.via_tracing {
            lock.with_sink(Arc::new(TracingSink))
        } else {
            lock
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> AnyResult<()> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let factory = factory_from_cli(&cli)?;
    tracing::info!(?factory, command = ?cli.command, "running scenario");

    match cli.command {
        CommandKind::ExclusiveRoundTrip => scenarios::exclusive_round_trip::run(factory),
        CommandKind::SharedReaders => scenarios::shared_readers::run(factory),
        CommandKind::LockOrderInversion => scenarios::lock_order_inversion::run(factory),
    }
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("rwtrace-examples")
                .description("Run rwtrace lock scenarios as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

fn factory_from_cli(cli: &Cli) -> AnyResult<LockFactory> {
    let mut capture = CaptureOptions::default();
    if let Some(max_frames) = cli.max_frames {
        let max_frames = NonZeroUsize::new(max_frames)
            .ok_or_else(|| "--max-frames must be at least 1".to_owned())?;
        capture = capture.max_frames(max_frames);
    }

    Ok(LockFactory {
        options: TraceOptions::default()
            .capture(capture)
            .confirm_transitions(cli.confirm),
        via_tracing: cli.via_tracing,
    })
}
