//! satlink - ULE over MPEG-TS encapsulation tool
//!
//! Cuts a byte stream into packets, encapsulates them as ULE SNDUs and packs
//! those into a TS file, or reverses the whole chain.

use anyhow::Context;
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use satlink_cli::{display_decap_summary, display_encap_summary, CliConfig, StreamLayer};
use satlink_protocol::framing::{pid_for_route, TsDeframer, TsPacketizer};
use satlink_protocol::net::{NetBurst, NetPacket, Route};
use satlink_protocol::registry::ExtensionRegistry;
use satlink_protocol::ule::Sndu;
use satlink_protocol::UleContext;
use std::fs;
use std::io::{self, Read, Write};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "satlink")]
#[command(about = "ULE over MPEG-TS encapsulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encapsulate a byte stream into a TS file
    Encap(EncapArgs),
    /// Recover the byte stream from a TS file
    Decap(DecapArgs),
    /// Print an example configuration file
    ExampleConfig,
}

#[derive(Args, Debug)]
struct EncapArgs {
    /// Input file, '-' for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Output TS file, '-' for stdout
    #[arg(short, long)]
    output: Option<String>,

    /// PID carrying the SNDUs (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_u16)]
    pid: Option<u16>,

    /// EtherType of the payload (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_u16)]
    ether_type: Option<u16>,

    /// Largest packet cut from the input
    #[arg(long)]
    mtu: Option<usize>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Args, Debug)]
struct DecapArgs {
    /// Input TS file, '-' for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Output file, '-' for stdout
    #[arg(short, long)]
    output: Option<String>,

    /// EtherType expected in the SNDUs (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_u16)]
    ether_type: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn load_config(path: Option<&str>) -> anyhow::Result<CliConfig> {
    match path {
        Some(path) => CliConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path)),
        None => Ok(CliConfig::default()),
    }
}

fn read_input(input: &str) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::new();
    if input == "-" {
        io::stdin().read_to_end(&mut data)?;
    } else {
        data = fs::read(input).with_context(|| format!("failed to read {}", input))?;
    }
    tracing::info!("Read {} bytes from {}", data.len(), input);
    Ok(data)
}

fn write_output(output: &str, chunks: &[Bytes]) -> anyhow::Result<()> {
    let mut writer: Box<dyn Write> = if output == "-" {
        Box::new(io::stdout().lock())
    } else {
        let file =
            fs::File::create(output).with_context(|| format!("failed to create {}", output))?;
        Box::new(io::BufWriter::new(file))
    };
    for chunk in chunks {
        writer.write_all(chunk)?;
    }
    writer.flush()?;
    Ok(())
}

fn build_context(config: &CliConfig) -> anyhow::Result<UleContext> {
    let registry = ExtensionRegistry::from_config(&config.encap.extensions)?;
    let upper = Arc::new(StreamLayer::new(config.payload_ether_type()));
    let ctx = UleContext::new(registry, upper, config.encap.crc_enabled);
    Ok(ctx.with_profile(config.encap.profile))
}

fn run_encap(args: EncapArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(pid) = args.pid {
        config.encap.mpeg.default_pid = pid;
    }
    if args.ether_type.is_some() {
        config.ether_type = args.ether_type;
    }
    if let Some(mtu) = args.mtu {
        config.mtu = mtu;
    }
    config.validate()?;

    let mut ctx = build_context(&config)?;
    let ether_type = config.payload_ether_type();
    let route = Route::new(0, 0, config.encap.mpeg.default_pid, 0);
    let pid = pid_for_route(&route);
    tracing::info!(
        pid,
        ether_type,
        mtu = config.mtu,
        extensions = ctx.registry().build_order().len(),
        "Encapsulating"
    );

    let data = Bytes::from(read_input(&config.input)?);
    let burst: NetBurst = (0..data.len())
        .step_by(config.mtu)
        .map(|offset| {
            let end = (offset + config.mtu).min(data.len());
            NetPacket::new(ether_type, data.slice(offset..end), route)
        })
        .collect();

    let sndus = ctx.encapsulate(burst);
    let mut packetizer = TsPacketizer::new(config.encap.mpeg.packing);
    let mut frames = Vec::new();
    for sndu in &sndus {
        frames.extend(packetizer.push(pid, route.dst_spot, &sndu.to_bytes()));
    }
    frames.extend(packetizer.flush_all());

    let frames: Vec<Bytes> = frames.into_iter().map(|frame| frame.data).collect();
    write_output(&config.output, &frames)?;

    if config.output != "-" {
        display_encap_summary(&ctx.stats(), &packetizer.stats(), data.len() as u64);
    }
    Ok(())
}

fn run_decap(args: DecapArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    if args.ether_type.is_some() {
        config.ether_type = args.ether_type;
    }
    config.validate()?;

    let mut ctx = build_context(&config)?;
    let data = read_input(&config.input)?;

    let mut deframer = TsDeframer::new();
    let sndus: Vec<Sndu> = deframer
        .push_stream(&data)
        .context("input is not a TS stream")?
        .into_iter()
        .map(|sndu| Sndu::new(sndu, Route::default()))
        .collect();

    let packets = ctx.decapsulate(sndus);
    let bytes_out: u64 = packets.iter().map(|p| p.len() as u64).sum();
    let chunks: Vec<Bytes> = packets.into_iter().map(|p| p.data).collect();
    write_output(&config.output, &chunks)?;

    if config.output != "-" {
        display_decap_summary(&ctx.stats(), &deframer.stats(), bytes_out);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Encap(args) => run_encap(args),
        Command::Decap(args) => run_decap(args),
        Command::ExampleConfig => {
            let text = toml::to_string_pretty(&CliConfig::example())?;
            print!("{}", text);
            Ok(())
        }
    }
}
