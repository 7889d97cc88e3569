//! pingtrace - ICMP ping and traceroute from the command line.
//!
//! This is the command-line interface for the pingtrace library.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pingtrace::dns::reverse::display_name;
use pingtrace::ping::{FnPingObserver, PingConfig, PingStatistics, Pinger};
use pingtrace::probe::{EchoProbeResult, SingleHopProbe};
use pingtrace::report;
use pingtrace::socket::{AddressFamily, Icmpv4, Icmpv6, SocketMode};
use pingtrace::traceroute::{
    CancelOnToken, FnObserver, HopSummary, RouteTracer, TraceResult, TracerouteConfig,
};
use std::net::IpAddr;
use std::ops::ControlFlow;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Get the version string for pingtrace
fn get_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(env!("CARGO_PKG_VERSION"), "-UNRELEASED")
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

/// Command-line arguments for the ping/traceroute tool.
#[derive(Parser, Debug)]
#[clap(author, version = get_version(), about = "ICMP ping and traceroute", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Enable verbose logging (-v info, -vv debug, -vvv trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send echo requests to a host
    Ping(PingArgs),
    /// Trace the route to a host
    Trace(TraceArgs),
}

/// Options shared by both commands
#[derive(Args, Debug)]
struct CommonArgs {
    /// Target hostname or IP address
    host: String,

    /// Use IPv6 (IPv4 otherwise)
    #[clap(short = '6', long)]
    ipv6: bool,

    /// Timeout for individual probes in milliseconds
    #[clap(short = 'w', long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Echo payload size in bytes
    #[clap(short = 'l', long = "size", default_value_t = 32)]
    size: usize,

    /// IPv4 type of service
    #[clap(long, default_value_t = 0)]
    tos: u8,

    /// Set the don't-fragment flag
    #[clap(short = 'f', long)]
    dont_fragment: bool,

    /// Source address to send from
    #[clap(short = 'S', long)]
    source: Option<IpAddr>,

    /// Show reverse names of responders
    #[clap(short = 'a', long)]
    resolve: bool,

    /// Socket mode to use (raw, dgram)
    #[clap(long, value_enum)]
    socket_mode: Option<SocketModeArg>,

    /// Output results in JSON format
    #[clap(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PingArgs {
    #[clap(flatten)]
    common: CommonArgs,

    /// Hop limit of each request
    #[clap(long, default_value_t = 128)]
    ttl: u8,

    /// Number of echo requests to send
    #[clap(short = 'n', long, default_value_t = 4)]
    count: u32,

    /// Ping until stopped with Ctrl-C
    #[clap(short = 't', long)]
    continuous: bool,

    /// Pause between requests in milliseconds
    #[clap(short = 'i', long, default_value_t = 1000)]
    interval_ms: u64,
}

#[derive(Args, Debug)]
struct TraceArgs {
    #[clap(flatten)]
    common: CommonArgs,

    /// Maximum number of hops
    #[clap(short = 'm', long, default_value_t = 30)]
    max_hops: u8,

    /// Number of probes per hop
    #[clap(short = 'q', long, default_value_t = 3)]
    probes_per_hop: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SocketModeArg {
    Raw,
    Dgram,
}

impl From<SocketModeArg> for SocketMode {
    fn from(arg: SocketModeArg) -> Self {
        match arg {
            SocketModeArg::Raw => SocketMode::Raw,
            SocketModeArg::Dgram => SocketMode::Dgram,
        }
    }
}

/// JSON output structure for one echo request
#[derive(Debug, serde::Serialize)]
struct JsonReply<A> {
    seq: u32,
    reply: Option<EchoProbeResult<A>>,
    error: Option<pingtrace::Error>,
}

/// JSON output structure for a ping session
#[derive(Debug, serde::Serialize)]
struct JsonPing<A> {
    version: String,
    replies: Vec<JsonReply<A>>,
    statistics: PingStatistics<A>,
}

/// JSON output structure for a trace
#[derive(Debug, serde::Serialize)]
struct JsonTrace<'a, A> {
    version: String,
    #[serde(flatten)]
    result: &'a TraceResult<A>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
            log::warn!("Failed to install Ctrl-C handler: {e}");
        }
    }

    let result = match &cli.command {
        Command::Ping(args) if args.common.ipv6 => run_ping::<Icmpv6>(args, &cancel),
        Command::Ping(args) => run_ping::<Icmpv4>(args, &cancel),
        Command::Trace(args) if args.common.ipv6 => run_trace::<Icmpv6>(args, &cancel),
        Command::Trace(args) => run_trace::<Icmpv4>(args, &cancel),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(if verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

/// Reverse name for display when `-a` was given
fn name_of<A: Into<IpAddr>>(resolve: bool, addr: A) -> Option<String> {
    resolve.then(|| display_name(addr.into())).flatten()
}

fn ping_config(args: &PingArgs) -> PingConfig {
    PingConfig {
        ttl: args.ttl,
        timeout: Duration::from_millis(args.common.timeout_ms),
        payload_size: args.common.size,
        tos: args.common.tos,
        dont_fragment: args.common.dont_fragment,
        count: args.count,
        continuous: args.continuous,
        interval: Duration::from_millis(args.interval_ms),
        local_address: args.common.source,
        socket_mode: args.common.socket_mode.map(SocketMode::from),
    }
}

fn trace_config(args: &TraceArgs) -> TracerouteConfig {
    TracerouteConfig {
        max_hops: args.max_hops,
        timeout: Duration::from_millis(args.common.timeout_ms),
        probes_per_hop: args.probes_per_hop,
        payload_size: args.common.size,
        tos: args.common.tos,
        dont_fragment: args.common.dont_fragment,
        reverse_route: false,
        local_address: args.common.source,
        socket_mode: args.common.socket_mode.map(SocketMode::from),
    }
}

/// Run a ping session; `Ok(false)` when no reply came back
fn run_ping<F: AddressFamily>(args: &PingArgs, cancel: &CancellationToken) -> Result<bool> {
    let common = &args.common;
    let config = ping_config(args);
    config.validate()?;
    config.probe_options().validate::<F>()?;

    if !common.json {
        println!("{}", report::ping_header(&common.host, config.payload_size));
    }

    let mut replies = Vec::new();
    let observer = FnPingObserver(|seq: u32, outcome: &pingtrace::Result<EchoProbeResult<F::Addr>>| {
        if common.json {
            replies.push(JsonReply {
                seq,
                reply: outcome.as_ref().ok().cloned(),
                error: outcome.as_ref().err().cloned(),
            });
        } else {
            let line = match outcome {
                Ok(reply) => report::ping_reply(reply, name_of(common.resolve, reply.responder).as_deref()),
                Err(e) => report::ping_failure(e),
            };
            println!("{line}");
        }
        ControlFlow::Continue(())
    });
    let mut observer = CancelOnToken::new(cancel.clone(), observer);

    let stats = Pinger::<F>::new(config)
        .run(&common.host, &mut observer)
        .with_context(|| format!("ping {} failed", common.host))?;
    drop(observer);

    if common.json {
        let output = JsonPing {
            version: get_version().to_string(),
            replies,
            statistics: stats.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        for line in report::ping_statistics(&stats) {
            println!("{line}");
        }
    }

    Ok(stats.received > 0)
}

/// Run a trace; `Ok(false)` when it stopped on an error
fn run_trace<F: AddressFamily>(args: &TraceArgs, cancel: &CancellationToken) -> Result<bool> {
    let common = &args.common;
    let config = trace_config(args);
    config.validate()?;
    config.probe_options(1).validate::<F>()?;

    if !common.json {
        println!("{}", report::trace_header(&common.host, config.max_hops));
        println!();
    }

    let observer = FnObserver::new(
        |_: u8, _: u8, _: &SingleHopProbe<F::Addr>| ControlFlow::Continue(()),
        |summary: &HopSummary<F::Addr>| {
            if !common.json {
                let name = summary
                    .responder
                    .and_then(|addr| name_of(common.resolve, addr));
                println!("{}", report::trace_hop(summary, name.as_deref()));
            }
            ControlFlow::Continue(())
        },
    );
    let mut observer = CancelOnToken::new(cancel.clone(), observer);

    let mut result = TraceResult::new(&common.host);
    let outcome = RouteTracer::<F>::new(config).trace_into(&common.host, &mut result, &mut observer);

    if common.json {
        let output = JsonTrace {
            version: get_version().to_string(),
            result: &result,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        if let Err(e) = &outcome {
            eprintln!("Error: {e}");
        }
    } else {
        println!();
        println!("{}", report::trace_footer(&outcome));
    }

    Ok(outcome.is_ok())
}
