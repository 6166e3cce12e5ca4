// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{anyhow, bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use slog::{debug, o, warn, Drain, Level, Logger};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::{Command as Process, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use switchtec::events::{EventIndex, EventQuery, EventType};
use switchtec::gas::{self, GasAccess, MrpcGas};
use switchtec::pmon::{BwType, EvcntrSetup};
use switchtec::status::PortStatus;
use switchtec::{
    EventId, Generation, Switchtec, LAT_ALL_INGRESS, MAX_EVENT_COUNTERS,
    MAX_STACKS,
};
use switchtec_cli::cli::{
    ask_if_sure, get_styles, level_from_str, parse_dword, parse_event_id,
    parse_event_type, parse_port_mask, parse_size,
};
use switchtec_cli::config::Config;
use switchtec_cli::format::{
    bytes_si, evcntr_details, evcntr_row, event_list, rate_si, sig3,
    utf8_locale, PortTitles,
};
use switchtec_cli::hexdump::HexDump;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, styles = get_styles())]
struct Cli {
    /// Device to manage: /dev/switchtecN, an index, switchtecN or a PCI
    /// address such as 0000:03:00.1.
    #[clap(long, global = true)]
    device: Option<String>,

    /// Configuration file.
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(long, global = true, default_value = "warn", value_parser = level_from_str)]
    log_level: Level,

    /// Print results as JSON where the command has any.
    #[clap(long, global = true)]
    json: bool,

    /// Access the GAS through MRPC commands instead of a memory mapping.
    #[clap(long, global = true)]
    mrpc_gas: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all the switchtec devices on this machine
    List {
        /// Print additional information about devices
        #[clap(short, long)]
        verbose: bool,
    },

    /// Display status of the ports on the switch
    Status {
        /// Reset byte counters
        #[clap(short, long)]
        reset: bool,
    },

    /// Measure switch bandwidth
    Bw {
        /// Measurement time, in seconds
        #[clap(short, long)]
        time: Option<u64>,

        /// Print posted, non-posted and completion results
        #[clap(short, long)]
        verbose: bool,
    },

    /// Select what the bandwidth counters count on every port
    BwType {
        #[clap(value_enum)]
        kind: BwKind,
    },

    /// Measure latency of a port
    Latency {
        /// Measurement time, in seconds
        #[clap(short, long)]
        time: Option<u64>,

        /// Physical port id for the egress side
        #[clap(short, long)]
        egress: u8,

        /// Physical port id for the ingress side, by default use all ports
        #[clap(short, long, default_value_t = LAT_ALL_INGRESS)]
        ingress: u8,
    },

    /// Display events that have occurred
    Events {
        /// Show events in all partitions
        #[clap(short, long)]
        all: bool,

        /// Clear all events
        #[clap(short, long)]
        reset: bool,

        /// Clear all events of a specified type
        #[clap(short, long, value_delimiter = ',', value_parser = parse_event_id)]
        event: Vec<EventId>,
    },

    /// Wait for an event to occur
    EventWait {
        /// Event to wait on
        #[clap(short, long, value_parser = parse_event_id)]
        event: EventId,

        /// Partition number for the event
        #[clap(short, long)]
        partition: Option<u32>,

        /// Port number for the event
        #[clap(short = 'q', long)]
        port: Option<u32>,

        /// Timeout in milliseconds, default is to wait forever
        #[clap(short, long)]
        timeout: Option<u64>,
    },

    /// Test if switchtec interface is working
    Test,

    /// Display die temperature of the switchtec device
    Temp,

    /// Perform a hard reset on the switch
    HardReset {
        /// Assume yes when prompted
        #[clap(short, long)]
        yes: bool,
    },

    /// Bind info for physical port
    PortBindInfo {
        /// Physical port number
        #[clap(short = 'f', long)]
        physical: u8,
    },

    /// Bind switchtec logical port to physical port
    PortBind {
        /// Partition number
        #[clap(short, long)]
        partition: u8,

        /// Logical port number
        #[clap(short, long)]
        logical: u8,

        /// Physical port number
        #[clap(short = 'f', long)]
        physical: u8,
    },

    /// Unbind switchtec logical port from physical port
    PortUnbind {
        /// Partition number
        #[clap(short, long)]
        partition: u8,

        /// Logical port number
        #[clap(short, long)]
        logical: u8,
    },

    /// Display event counters
    Evcntr {
        /// Stack to display, default is every stack
        #[clap(short, long)]
        stack: Option<u8>,

        /// Reset counters back to zero
        #[clap(short, long)]
        reset: bool,
    },

    /// Setup a new event counter
    EvcntrSetup(EvcntrSetupArgs),

    /// Display setup information for an event counter
    EvcntrShow(CounterArgs),

    /// Deconfigure an event counter
    EvcntrDel(CounterArgs),

    /// Wait for an event counter to exceed its threshold
    EvcntrWait {
        /// Timeout in milliseconds, default is to wait forever
        #[clap(short, long)]
        timeout: Option<u64>,
    },

    /// Access the global address space
    Gas {
        #[clap(subcommand)]
        command: GasCommand,
    },

    /// Inject a link error
    LinkerrInject(LinkerrArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum BwKind {
    /// Count every byte on the link
    Raw,
    /// Count TLP payload bytes only
    Payload,
}

impl From<BwKind> for BwType {
    fn from(k: BwKind) -> Self {
        match k {
            BwKind::Raw => BwType::Raw,
            BwKind::Payload => BwType::Payload,
        }
    }
}

#[derive(Args, Debug)]
struct CounterArgs {
    /// Stack the counter lives in
    #[clap(short, long)]
    stack: u8,

    /// Counter index
    #[clap(short, long)]
    counter: usize,
}

#[derive(Args, Debug)]
struct EvcntrSetupArgs {
    /// Stack to create the counter in
    #[clap(short, long)]
    stack: u8,

    /// Event to count on, may be given several times to count on multiple
    /// events
    #[clap(short, long, required = true, value_delimiter = ',', value_parser = parse_event_type)]
    event: Vec<u32>,

    /// Counter index, default is to use the next unused index
    #[clap(short, long)]
    counter: Option<usize>,

    /// Measure egress TLPs instead of ingress; only meaningful for
    /// POSTED_TLP, COMP_TLP and NON_POSTED_TLP counts
    #[clap(short = 'g', long)]
    egress: bool,

    /// Ports to capture events on (0xXX or #,#,#-#), default is all ports
    #[clap(short, long, value_parser = parse_port_mask)]
    port_mask: Option<u8>,

    /// Threshold to trigger an event notification
    #[clap(short, long, default_value_t = 0)]
    thresh: u32,
}

#[derive(Subcommand, Debug)]
enum GasCommand {
    /// Dump the global address space
    Dump {
        /// Number of bytes to dump, default is the entire space
        #[clap(short = 'n', long, value_parser = parse_size)]
        count: Option<u64>,

        /// Force text output even when stdout is a pipe
        #[clap(short, long)]
        text: bool,
    },

    /// Read a register from the global address space
    Read {
        /// Address to read
        #[clap(short, long, value_parser = parse_size)]
        addr: u64,

        /// Number of bytes to read per access
        #[clap(short, long, default_value_t = 4)]
        bytes: usize,

        /// Number of accesses to perform
        #[clap(short = 'n', long, default_value_t = 1, value_parser = parse_size)]
        count: u64,

        /// Printing style
        #[clap(short, long, value_enum, default_value_t = PrintStyle::Hex)]
        print: PrintStyle,
    },

    /// Write a register in the global address space
    Write {
        /// Address to write
        #[clap(short, long, value_parser = parse_size)]
        addr: u64,

        /// Number of bytes to write
        #[clap(short, long, default_value_t = 4)]
        bytes: usize,

        /// Value to write
        #[clap(short, long, value_parser = parse_size)]
        value: u64,

        /// Assume yes when prompted
        #[clap(short, long)]
        yes: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PrintStyle {
    /// Print in hexadecimal
    Hex,
    /// Print in decimal
    Dec,
    /// Print as an ascii string
    Str,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("kind")
        .required(true)
        .args(["dllp", "dllp_crc", "tlp_lcrc", "tlp_seq", "nack", "cto"])
))]
struct LinkerrArgs {
    /// Inject a DLLP
    #[clap(short = 'd', long)]
    dllp: bool,

    /// Inject a DLLP CRC error
    #[clap(short = 'D', long)]
    dllp_crc: bool,

    /// Inject a TLP LCRC error
    #[clap(short = 'l', long)]
    tlp_lcrc: bool,

    /// Inject a TLP sequence number error
    #[clap(short = 's', long)]
    tlp_seq: bool,

    /// Inject an ACK to NACK error
    #[clap(short = 'n', long)]
    nack: bool,

    /// Inject a TLP credit timeout
    #[clap(short = 't', long)]
    cto: bool,

    /// Physical port id
    #[clap(short, long, default_value_t = 0)]
    port: u8,

    /// Enable DLLP CRC or TLP LCRC error injection
    #[clap(short, long, default_value_t = 0)]
    enable: u8,

    /// DLLP data to inject, a single dword in hex prefixed with "0x"
    #[clap(short = 'i', long, value_parser = parse_dword)]
    data: Option<u32>,

    /// Sequence number of the ACK to be replaced by a NACK (0-4095)
    #[clap(short = 'S', long, default_value_t = 0)]
    seq_num: u16,

    /// Number of times to replace the ACK with a NACK
    #[clap(short, long, default_value_t = 0)]
    count: u8,

    /// Errors are injected at intervals of rate x 256 clocks (0-4096)
    #[clap(short = 'r', long, default_value_t = 0)]
    dllp_crc_rate: u16,

    /// 0-7; a rate of 1 puts an error in every other TLP
    #[clap(short = 'R', long, default_value_t = 0)]
    tlp_lcrc_rate: u8,
}

fn init_logger(level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let mut builder = slog_envlogger::LogBuilder::new(drain);
    if let Some(filter) = slog::FilterLevel::from_usize(level.as_usize()) {
        builder = builder.filter(None, filter);
    }
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder = builder.parse(&filters);
    }
    let drain = builder.build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x2000)
        .build()
        .fuse();
    slog::Logger::root(drain, o!())
}

struct Ctx {
    log: Logger,
    config: Config,
    device: Option<String>,
    json: bool,
    mrpc_gas: bool,
}

impl Ctx {
    fn open(&self) -> anyhow::Result<Switchtec> {
        let name = self
            .device
            .as_deref()
            .or(self.config.device.as_deref())
            .ok_or_else(|| {
                anyhow!("no device given; use --device or set one in the config file")
            })?;
        let dev = Switchtec::open(name).with_context(|| format!("open {}", name))?;
        debug!(self.log, "opened device";
            "name" => name,
            "partition" => dev.partition(),
            "gen" => ?dev.generation(),
        );
        Ok(dev.with_logger(self.log.clone()))
    }

    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn measure_time(&self, time: Option<u64>) -> Duration {
        Duration::from_secs(time.unwrap_or(self.config.measure_time))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log = init_logger(cli.log_level);
    let config = Config::load(cli.config.as_deref())?;

    let ctx = Ctx {
        log,
        config,
        device: cli.device,
        json: cli.json,
        mrpc_gas: cli.mrpc_gas,
    };

    match cli.command {
        Command::List { verbose } => list(&ctx, verbose),
        Command::Status { reset } => status(&ctx, reset),
        Command::Bw { time, verbose } => bw(&ctx, time, verbose),
        Command::BwType { kind } => {
            let mut dev = ctx.open()?;
            dev.bwcntr_set_all(kind.into()).context("bw-type")
        }
        Command::Latency {
            time,
            egress,
            ingress,
        } => latency(&ctx, time, egress, ingress),
        Command::Events { all, reset, event } => events(&ctx, all, reset, &event),
        Command::EventWait {
            event,
            partition,
            port,
            timeout,
        } => event_wait(&ctx, event, partition, port, timeout),
        Command::Test => test(&ctx),
        Command::Temp => temp(&ctx),
        Command::HardReset { yes } => hard_reset(&ctx, yes),
        Command::PortBindInfo { physical } => port_bind_info(&ctx, physical),
        Command::PortBind {
            partition,
            logical,
            physical,
        } => {
            let mut dev = ctx.open()?;
            dev.bind(partition, logical, physical).context("bind")
        }
        Command::PortUnbind { partition, logical } => {
            let mut dev = ctx.open()?;
            dev.unbind(partition, logical).context("unbind")
        }
        Command::Evcntr { stack, reset } => evcntr(&ctx, stack, reset),
        Command::EvcntrSetup(args) => evcntr_setup(&ctx, args),
        Command::EvcntrShow(args) => evcntr_show(&ctx, args),
        Command::EvcntrDel(args) => {
            let mut dev = ctx.open()?;
            dev.evcntr_del(args.stack, args.counter).context("evcntr_del")
        }
        Command::EvcntrWait { timeout } => evcntr_wait(&ctx, timeout),
        Command::Gas { command } => gas_cmd(&ctx, command),
        Command::LinkerrInject(args) => linkerr_inject(&ctx, args),
    }
}

fn list(ctx: &Ctx, verbose: bool) -> anyhow::Result<()> {
    let devices = switchtec::list().context("list")?;

    if ctx.json {
        return ctx.print_json(&devices);
    }

    for d in &devices {
        println!(
            "{:<20}\t{:<15}\t{:<5}\t{:<10}\t{}",
            d.name, d.product_id, d.product_rev, d.fw_version, d.pci_dev
        );
        if verbose {
            println!("\t{}", d.path.display());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PortReport<'a> {
    #[serde(flatten)]
    status: &'a PortStatus,
    egress_bytes: u64,
    ingress_bytes: u64,
}

fn status(ctx: &Ctx, reset: bool) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let ports = dev.status().context("status")?;

    let ids: Vec<u8> = ports.iter().map(|s| s.port.phys_id).collect();
    let mut bw = dev.bwcntr_many(&ids, reset).context("bwcntr")?;
    if reset {
        bw.iter_mut().for_each(|b| *b = Default::default());
    }

    if ctx.json {
        let report: Vec<PortReport> = ports
            .iter()
            .zip(&bw)
            .map(|(s, b)| PortReport {
                status: s,
                egress_bytes: b.egress.total(),
                ingress_bytes: b.ingress.total(),
            })
            .collect();
        return ctx.print_json(&report);
    }

    let mut titles = PortTitles::new(dev.partition());
    for (s, b) in ports.iter().zip(&bw) {
        println!("{}", titles.title(&s.port));

        if s.port.partition == switchtec::UNBOUND_PORT {
            continue;
        }

        println!(
            "\tPhys Port ID:    \t{} (Stack {}, Port {})",
            s.port.phys_id, s.port.stack, s.port.stk_id
        );
        println!("\tStatus:          \t{}", if s.link_up { "UP" } else { "DOWN" });
        println!("\tLTSSM:           \t{}", s.ltssm_str);
        println!("\tMax-Width:       \tx{}", s.cfg_lnk_width);

        if !s.link_up {
            continue;
        }

        println!("\tNeg Width:       \tx{}", s.neg_lnk_width);
        if let (Some(gt), Some(mb)) = (s.transfer_rate(), s.data_rate()) {
            println!(
                "\tRate:            \tGen{} - {} GT/s  {} GB/s",
                s.link_rate,
                sig3(gt as f64),
                sig3(mb as f64 / 1000.0)
            );
        }
        println!("\tOut Bytes:       \t{}", bytes_si(b.egress.total()));
        println!("\tIn Bytes:        \t{}", bytes_si(b.ingress.total()));
    }
    Ok(())
}

/// Sleep for the measurement window, with a spinner when someone is
/// watching.
fn wait_measurement(msg: &str, window: Duration) {
    if !io::stderr().is_terminal() {
        std::thread::sleep(window);
        return;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg} {elapsed}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    std::thread::sleep(window);
    pb.finish_and_clear();
}

fn bw(ctx: &Ctx, time: Option<u64>, verbose: bool) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let before = dev.bwcntr_all(false).context("bw")?;
    wait_measurement("measuring bandwidth", ctx.measure_time(time));
    let after = dev.bwcntr_all(false).context("bw")?;

    let results: Vec<_> = before
        .iter()
        .zip(after)
        .map(|((port, old), (_, mut new))| {
            new.sub(old);
            (*port, new)
        })
        .collect();

    if ctx.json {
        return ctx.print_json(&results);
    }

    let line = |msg: &str, bytes: u64, time_us: u64| {
        println!("\t{:<8}\t{}", msg, rate_si(bytes, time_us));
    };

    let mut titles = PortTitles::new(dev.partition());
    for (port, r) in &results {
        println!("{}", titles.title(port));
        let t = r.time_us;

        if !verbose {
            line("Out:", r.egress.total(), t);
            line("In:", r.ingress.total(), t);
            continue;
        }

        for (name, dir) in [("Out:", &r.egress), ("In:", &r.ingress)] {
            println!("\t{}", name);
            line("  Posted:", dir.posted, t);
            line("  Non-Posted:", dir.nonposted, t);
            line("  Completion:", dir.comp, t);
            line("  Total:", dir.total(), t);
        }
    }
    Ok(())
}

fn latency(ctx: &Ctx, time: Option<u64>, egress: u8, ingress: u8) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    dev.lat_setup(egress, ingress, true).context("latency")?;
    wait_measurement("measuring latency", ctx.measure_time(time));
    let lat = dev.lat_get(false, egress).context("latency")?;

    if ctx.json {
        return ctx.print_json(&lat);
    }

    println!("Current: {} ns", lat.cur_ns);
    println!("Maximum: {} ns", lat.max_ns);
    Ok(())
}

fn test(ctx: &Ctx) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let input = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0x5A5A_5A5A);

    let out = dev.echo(input).context("echo")?;
    if out != !input {
        bail!(
            "echo command returned the wrong result; got {:x}, expected {:x}",
            out,
            !input
        );
    }

    eprintln!("{}: success", dev.name());
    Ok(())
}

fn temp(ctx: &Ctx) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let t = dev.die_temp().context("die_temp")?;

    if ctx.json {
        return ctx.print_json(&serde_json::json!({ "die_temp": t }));
    }

    let unit = if utf8_locale() { "°C" } else { "degC" };
    println!("{} {}", sig3(t as f64), unit);
    Ok(())
}

fn events(ctx: &Ctx, all: bool, reset: bool, clear: &[EventId]) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let sum = dev.event_summary().context("event_summary")?;

    let query = EventQuery {
        all_partitions: all,
        clear_all: reset,
        clear: clear.iter().fold(0, |m, e| m | e.mask()),
        index: None,
    };
    let list = dev.events(&sum, &query).context("event_ctl")?;

    if ctx.json {
        return ctx.print_json(&list);
    }
    print!("{}", event_list(&list));
    Ok(())
}

fn event_wait(
    ctx: &Ctx,
    event: EventId,
    partition: Option<u32>,
    port: Option<u32>,
    timeout: Option<u64>,
) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;

    let index = match event.info().kind {
        EventType::Global => EventIndex::All,
        EventType::Partition => {
            if port.is_some() {
                bail!("Port cannot be specified for this event type.");
            }
            partition.map_or(EventIndex::All, |p| EventIndex::Index(p as usize))
        }
        EventType::Pff => match (partition, port) {
            (None, None) => EventIndex::All,
            (Some(part), Some(port)) => {
                EventIndex::Index(dev.port_to_pff(part, port).context("port")?)
            }
            _ => bail!("Must specify partition and port for this event type."),
        },
    };

    let Some(sum) = dev
        .event_wait_for(event, index, timeout.map(Duration::from_millis))
        .context("event-wait")?
    else {
        bail!("timeout");
    };

    let query = EventQuery {
        all_partitions: true,
        index: match index {
            EventIndex::Index(i) => Some(i),
            _ => None,
        },
        ..Default::default()
    };
    let list = dev.events(&sum, &query).context("event_ctl")?;

    if ctx.json {
        return ctx.print_json(&list);
    }
    print!("{}", event_list(&list));
    Ok(())
}

fn confirm(yes: bool) -> anyhow::Result<()> {
    if ask_if_sure(yes)? {
        return Ok(());
    }
    eprintln!("Abort.");
    bail!("aborted by user")
}

fn hard_reset(ctx: &Ctx, yes: bool) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;

    if !yes {
        eprintln!(
            "WARNING: if your system does not support hotplug,\n\
             a hard reset can leave the system in a broken state.\n\
             Make sure you reboot after issuing this command.\n"
        );
    }
    confirm(yes)?;

    dev.hard_reset().context("hard reset")?;
    warn!(ctx.log, "hard reset issued"; "device" => dev.name());
    eprintln!("{}: hard reset", dev.name());
    Ok(())
}

fn port_bind_info(ctx: &Ctx, physical: u8) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let info = dev.bind_info(physical).context("bind_info")?;

    if ctx.json {
        return ctx.print_json(&info);
    }

    println!("physical port: {}", physical);
    for i in &info {
        println!("bind state: {}", i.state);
        println!(
            "physical port {} bound to {}, partition {}",
            i.phys_port_id, i.log_port_id, i.par_id
        );
    }
    Ok(())
}

fn evcntr(ctx: &Ctx, stack: Option<u8>, reset: bool) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;

    let Some(stack) = stack else {
        let mut all = Vec::new();
        for s in 0..MAX_STACKS as u8 {
            // Stacks that do not exist on smaller parts are skipped.
            match dev.evcntr_get_both(s, 0, MAX_EVENT_COUNTERS, reset) {
                Ok(counters) => all.push((s, counters)),
                Err(e) => debug!(ctx.log, "skipping stack"; "stack" => s, "error" => %e),
            }
        }
        return show_counters(ctx, &all);
    };

    let counters = dev
        .evcntr_get_both(stack, 0, MAX_EVENT_COUNTERS, reset)
        .context("display events")?;
    show_counters(ctx, &[(stack, counters)])
}

fn show_counters(ctx: &Ctx, stacks: &[(u8, Vec<(EvcntrSetup, u32)>)]) -> anyhow::Result<()> {
    let configured = |c: &&(EvcntrSetup, u32)| c.0.port_mask != 0 && c.0.type_mask != 0;

    if ctx.json {
        #[derive(Serialize)]
        struct Counter {
            stack: u8,
            counter: usize,
            #[serde(flatten)]
            setup: EvcntrSetup,
            count: u32,
        }
        let out: Vec<Counter> = stacks
            .iter()
            .flat_map(|(stack, counters)| {
                counters
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| configured(c))
                    .map(move |(i, (setup, count))| Counter {
                        stack: *stack,
                        counter: i,
                        setup: *setup,
                        count: *count,
                    })
            })
            .collect();
        return ctx.print_json(&out);
    }

    for (stack, counters) in stacks {
        println!("Stack {}:", stack);
        let mut shown = 0;
        for (i, c) in counters.iter().enumerate() {
            if !configured(&c) {
                continue;
            }
            println!("{}", evcntr_row(i, &c.0, c.1));
            shown += 1;
        }
        if shown == 0 {
            println!("  No event counters enabled.");
        }
    }
    Ok(())
}

fn free_counter(dev: &mut Switchtec, stack: u8) -> anyhow::Result<usize> {
    let setups = dev
        .evcntr_get_setup(stack, 0, MAX_EVENT_COUNTERS)
        .context("evcntr_get_setup")?;
    setups
        .iter()
        .position(|s| s.port_mask == 0 || s.type_mask == 0)
        .ok_or_else(|| anyhow!("no free event counter in stack {}", stack))
}

fn evcntr_wait(ctx: &Ctx, timeout: Option<u64>) -> anyhow::Result<()> {
    let fired = ctx
        .open()?
        .evcntr_wait(timeout.map(Duration::from_millis))
        .context("evcntr_wait")?;
    if !fired {
        bail!("timeout");
    }
    evcntr(ctx, None, false)
}

fn evcntr_setup(ctx: &Ctx, args: EvcntrSetupArgs) -> anyhow::Result<()> {
    let setup = EvcntrSetup {
        port_mask: match args.port_mask {
            None | Some(0) => 0xFF,
            Some(m) => m,
        },
        type_mask: args.event.iter().fold(0, |m, e| m | e),
        egress: args.egress,
        threshold: args.thresh,
    };

    if setup.threshold != 0
        && setup.port_mask.count_ones() > 1
        && setup.type_mask.count_ones() > 1
    {
        bail!(
            "A threshold can only be used with a counter that has a single \
             port and single event"
        );
    }

    let mut dev = ctx.open()?;
    let counter = match args.counter {
        Some(c) => c,
        None => free_counter(&mut dev, args.stack)?,
    };

    print!("{}", evcntr_details(args.stack, counter, &setup));
    dev.evcntr_setup(args.stack, counter, &setup)
        .context("evcntr-setup")
}

fn evcntr_show(ctx: &Ctx, args: CounterArgs) -> anyhow::Result<()> {
    let mut dev = ctx.open()?;
    let setup = dev
        .evcntr_get_setup(args.stack, args.counter, 1)
        .context("evcntr_show")?
        .pop()
        .unwrap_or_default();

    if ctx.json {
        return ctx.print_json(&setup);
    }
    print!("{}", evcntr_details(args.stack, args.counter, &setup));
    Ok(())
}

fn with_gas<T>(
    ctx: &Ctx,
    writable: bool,
    f: impl FnOnce(&mut dyn GasAccess) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let mut dev = ctx.open()?;
    if ctx.mrpc_gas {
        let mut gas = MrpcGas::new(&mut dev);
        f(&mut gas)
    } else {
        let mut gas = dev.gas_map(writable).context("gas_map")?;
        f(gas.as_mut())
    }
}

fn gas_cmd(ctx: &Ctx, command: GasCommand) -> anyhow::Result<()> {
    match command {
        GasCommand::Dump { count, text } => {
            with_gas(ctx, false, |g| gas_dump(ctx, g, count, text))
        }
        GasCommand::Read {
            addr,
            bytes,
            count,
            print,
        } => with_gas(ctx, false, |g| {
            let mut addr = addr as usize;
            for _ in 0..count {
                print_register(g, addr, bytes, print)?;
                addr += bytes;
            }
            Ok(())
        }),
        GasCommand::Write {
            addr,
            bytes,
            value,
            yes,
        } => with_gas(ctx, true, |g| {
            gas::validate_write(&*g, addr as usize, bytes, value).context("gas write")?;
            if !yes {
                eprintln!("Writing 0x{:x} to {:06x} ({} bytes).", value, addr, bytes);
            }
            confirm(yes)?;
            gas::gas_write(g, addr as usize, bytes, value).context("gas write")?;
            Ok(())
        }),
    }
}

fn print_register(
    g: &mut dyn GasAccess,
    addr: usize,
    bytes: usize,
    style: PrintStyle,
) -> anyhow::Result<()> {
    match style {
        PrintStyle::Hex => {
            let (addr, v) = gas::gas_read(g, addr, bytes)?;
            println!("{:06X} - 0x{:0width$X}", addr, v, width = bytes * 2);
        }
        PrintStyle::Dec => {
            let (addr, v) = gas::gas_read(g, addr, bytes)?;
            println!("{:06X} - {}", addr, v);
        }
        PrintStyle::Str => {
            let mut buf = vec![0u8; bytes];
            gas::gas_read_bytes(g, addr, &mut buf)?;
            let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
            println!("{:06X} - {}", addr, String::from_utf8_lossy(&buf[..end]));
        }
    }
    Ok(())
}

// Bytes fetched per GAS access while dumping.
const DUMP_BLOCK: usize = 4096;

fn copy_gas(
    g: &mut dyn GasAccess,
    len: usize,
    mut sink: impl FnMut(&[u8]) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; DUMP_BLOCK];
    let mut off = 0;
    while off < len {
        let n = (len - off).min(DUMP_BLOCK);
        gas::gas_read_bytes(g, off, &mut buf[..n])?;
        match sink(&buf[..n]) {
            Ok(()) => {}
            // The reader went away, e.g. the pager was closed.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        off += n;
    }
    Ok(())
}

fn hexdump_text(g: &mut dyn GasAccess, len: usize) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut hd = HexDump::new(0);
    copy_gas(g, len, |b| hd.feed(&mut out, b))?;
    hd.finish(&mut out)?;
    Ok(())
}

fn gas_dump(
    ctx: &Ctx,
    g: &mut dyn GasAccess,
    count: Option<u64>,
    text: bool,
) -> anyhow::Result<()> {
    let len = match count {
        Some(n) if n != 0 && (n as usize) < g.size() => n as usize,
        _ => g.size(),
    };

    if text {
        return hexdump_text(g, len);
    }

    if !io::stdout().is_terminal() {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        copy_gas(g, len, |b| out.write_all(b))?;
        return Ok(());
    }

    // switchtec -> hd -> less
    let pager = Process::new(&ctx.config.pager)
        .stdin(Stdio::piped())
        .spawn();
    let mut pager = match pager {
        Ok(p) => p,
        Err(e) => {
            warn!(ctx.log, "cannot start pager, dumping as text";
                "pager" => &ctx.config.pager, "error" => %e);
            return hexdump_text(g, len);
        }
    };
    let pager_in = pager
        .stdin
        .take()
        .ok_or_else(|| anyhow!("pager stdin unavailable"))?;

    let mut hd = Process::new(&ctx.config.hexdump)
        .stdin(Stdio::piped())
        .stdout(pager_in)
        .spawn()
        .with_context(|| format!("spawn {}", ctx.config.hexdump))?;
    let mut hd_in = hd
        .stdin
        .take()
        .ok_or_else(|| anyhow!("hexdump stdin unavailable"))?;

    let result = copy_gas(g, len, |b| hd_in.write_all(b));
    drop(hd_in);
    hd.wait()?;
    pager.wait()?;
    result
}

fn linkerr_inject(ctx: &Ctx, a: LinkerrArgs) -> anyhow::Result<()> {
    let ignoring = |flag: &str| {
        println!("Ignoring {} flag, not valid for the currently selected command.", flag)
    };
    if a.enable != 0 && !(a.dllp_crc || a.tlp_lcrc) {
        ignoring("-e enable");
    }
    if !a.nack && a.count != 0 {
        ignoring("-c");
    }
    if !a.nack && a.seq_num != 0 {
        ignoring("-S");
    }
    if !a.tlp_lcrc && a.tlp_lcrc_rate != 0 {
        ignoring("-R");
    }
    if !a.dllp_crc && a.dllp_crc_rate != 0 {
        ignoring("-r");
    }
    if !a.dllp && a.data.is_some() {
        ignoring("-i");
    }
    if a.dllp_crc_rate != 0 && a.tlp_lcrc_rate != 0 {
        bail!("Cannot enable both rate configurations.");
    }

    let mut dev = ctx.open()?;
    let enable = a.enable != 0;
    let port = a.port;

    let status = if a.dllp {
        dev.inject_err_dllp(port, a.data.unwrap_or(0))
    } else if a.dllp_crc {
        dev.inject_err_dllp_crc(port, enable, a.dllp_crc_rate)
    } else if a.tlp_lcrc {
        dev.inject_err_tlp_lcrc(port, enable, a.tlp_lcrc_rate)
    } else if a.tlp_seq {
        dev.inject_err_tlp_seq_num(port)
    } else if a.nack {
        dev.inject_err_ack_nack(port, a.seq_num, a.count)
    } else {
        if dev.generation() != Generation::Gen5 {
            bail!("Credit timeout error injection is only supported on Gen5.");
        }
        dev.inject_err_cto(port)
    }
    .context("linkerr-inject")?;

    debug!(ctx.log, "injection complete"; "port" => port, "status" => status);
    Ok(())
}
