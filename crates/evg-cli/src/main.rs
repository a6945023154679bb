//! `evg` — command-line interface for VME-EVG230/RF timing event generators.
//!
//! ```text
//! USAGE:
//!   evg --device NAME@IP:PORT/FREQ_HZ [--device ...] [--name NAME] <command>
//!
//!   evg --device evg0@10.0.0.20:2000/125000000 report
//!   evg --device evg0@10.0.0.20:2000/125000000 enable on
//!   evg --device evg0@10.0.0.20:2000/125000000 set-event 0 5 127
//!   evg --device evg0@10.0.0.20:2000/125000000 get-timestamp 0 5
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use evg_driver::{
    DeviceConfig, EvgDevice, EvgRegistry, ResetPolicy, RfClockSource, Sequencer,
};

#[derive(Parser)]
#[command(name = "evg", about = "VME-EVG230/RF timing event generator CLI", version)]
struct Cli {
    /// Device registration, repeatable: NAME@IP:PORT/FREQ_HZ.
    #[arg(long = "device", value_name = "SPEC", required = true)]
    devices: Vec<String>,

    /// Device to address; defaults to the first one configured.
    #[arg(long)]
    name: Option<String>,

    /// Reset behavior applied at init.
    #[arg(long, value_enum, default_value = "disable")]
    reset: ResetArg,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum ResetArg {
    None,
    Disable,
    Factory,
}

impl From<ResetArg> for ResetPolicy {
    fn from(arg: ResetArg) -> Self {
        match arg {
            ResetArg::None => Self::None,
            ResetArg::Disable => Self::Disable,
            ResetArg::Factory => Self::Factory,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// List every configured device.
    Report,
    /// Master enable or disable the card.
    Enable { state: Switch },
    /// Show enable state, RF settings, and firmware revision.
    Status,
    /// Print the firmware revision word.
    Firmware,
    /// Print or set the RF clock prescaler (divisor 1-31).
    RfPrescaler { value: Option<u16> },
    /// Select the RF clock source.
    RfSource {
        #[arg(value_enum)]
        source: RfSourceArg,
    },
    /// Start or stop a sequencer.
    SeqEnable { sequencer: u8, state: Switch },
    /// Pulse a sequencer's soft trigger.
    SeqTrigger { sequencer: u8 },
    /// Set a sequencer's clock prescaler.
    SeqPrescaler { sequencer: u8, value: u16 },
    /// Program an event code at a sequence RAM address.
    SetEvent { sequencer: u8, address: u16, code: u16 },
    /// Read the event code at a sequence RAM address.
    GetEvent { sequencer: u8, address: u16 },
    /// Program a timestamp (seconds) at a sequence RAM address.
    SetTimestamp {
        sequencer: u8,
        address: u16,
        seconds: f64,
    },
    /// Read the timestamp (seconds) at a sequence RAM address.
    GetTimestamp { sequencer: u8, address: u16 },
    /// Program a multiplexed counter's 32-bit prescaler.
    MxcPrescaler { counter: u8, value: u32 },
    /// Inject a software event code.
    SoftEvent { code: u16 },
}

#[derive(Clone, Copy, ValueEnum)]
enum RfSourceArg {
    Internal,
    External,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    let mut registry = EvgRegistry::new();
    for spec in &cli.devices {
        let config = parse_device_spec(spec)?.with_reset(cli.reset.into());
        registry.configure(config)?;
    }

    // The report needs no card traffic; everything else does.
    if matches!(cli.command, Cmd::Report) {
        print!("{}", registry.report());
        return Ok(());
    }

    let target = match &cli.name {
        Some(name) => name.clone(),
        None => registry.devices()[0].name().to_string(),
    };

    let failures = registry.init();
    for (device, error) in &failures {
        eprintln!("init failed for {device}: {error}");
    }
    if failures.iter().any(|(device, _)| *device == target) {
        bail!("device {target} did not initialize");
    }

    let device = registry.device(registry.open(&target)?);
    let outcome = run(&cli.command, device);
    registry.shutdown();
    outcome
}

fn run(command: &Cmd, device: &EvgDevice) -> Result<()> {
    match command {
        Cmd::Report => unreachable!("handled before init"),
        Cmd::Enable { state } => device.enable(state.is_on())?,
        Cmd::Status => {
            println!("device    : {}", device.name());
            println!("endpoint  : {}", device.config().endpoint());
            println!("enabled   : {}", device.is_enabled()?);
            println!("rf source : {:?}", device.get_rf_clock_source()?);
            println!("rf presc  : {}", device.get_rf_prescaler()?);
            println!("ac presc  : {}", device.get_ac_prescaler()?);
            println!("firmware  : {:#06x}", device.get_firmware_version()?);
        }
        Cmd::Firmware => println!("{:#06x}", device.get_firmware_version()?),
        Cmd::RfPrescaler { value: Some(p) } => device.set_rf_prescaler(*p)?,
        Cmd::RfPrescaler { value: None } => println!("{}", device.get_rf_prescaler()?),
        Cmd::RfSource { source } => {
            let source = match source {
                RfSourceArg::Internal => RfClockSource::Internal,
                RfSourceArg::External => RfClockSource::External,
            };
            device.set_rf_clock_source(source)?;
        }
        Cmd::SeqEnable { sequencer, state } => {
            device.enable_sequencer(parse_sequencer(*sequencer)?, state.is_on())?;
        }
        Cmd::SeqTrigger { sequencer } => {
            device.trigger_sequencer(parse_sequencer(*sequencer)?)?;
        }
        Cmd::SeqPrescaler { sequencer, value } => {
            device.set_sequencer_prescaler(parse_sequencer(*sequencer)?, *value)?;
        }
        Cmd::SetEvent {
            sequencer,
            address,
            code,
        } => device.set_event(parse_sequencer(*sequencer)?, *address, *code)?,
        Cmd::GetEvent { sequencer, address } => {
            let code = device.get_event(parse_sequencer(*sequencer)?, *address)?;
            println!("{code:#04x}");
        }
        Cmd::SetTimestamp {
            sequencer,
            address,
            seconds,
        } => device.set_timestamp(parse_sequencer(*sequencer)?, *address, *seconds)?,
        Cmd::GetTimestamp { sequencer, address } => {
            let seconds = device.get_timestamp(parse_sequencer(*sequencer)?, *address)?;
            println!("{seconds:.9}");
        }
        Cmd::MxcPrescaler { counter, value } => {
            device.set_counter_prescaler(*counter, *value)?;
        }
        Cmd::SoftEvent { code } => device.set_software_event(*code)?,
    }
    Ok(())
}

fn parse_sequencer(index: u8) -> Result<Sequencer> {
    Sequencer::from_index(index).with_context(|| format!("sequencer must be 0 or 1, got {index}"))
}

/// Parse `NAME@IP:PORT/FREQ_HZ` into a device configuration.
fn parse_device_spec(spec: &str) -> Result<DeviceConfig> {
    let (name, rest) = spec
        .split_once('@')
        .with_context(|| format!("expected NAME@IP:PORT/FREQ_HZ, got {spec:?}"))?;
    let (endpoint, frequency) = rest
        .split_once('/')
        .with_context(|| format!("missing /FREQ_HZ in {spec:?}"))?;
    let (ip, port) = endpoint
        .split_once(':')
        .with_context(|| format!("missing :PORT in {spec:?}"))?;

    let config = DeviceConfig::new(
        name,
        ip.parse().with_context(|| format!("invalid IPv4 address {ip:?}"))?,
        port.parse().with_context(|| format!("invalid port {port:?}"))?,
        frequency
            .parse()
            .with_context(|| format!("invalid frequency {frequency:?}"))?,
    )?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_device_spec() {
        let config = parse_device_spec("evg0@10.0.0.20:2000/125000000").unwrap();
        assert_eq!(config.name, "evg0");
        assert_eq!(config.endpoint().to_string(), "10.0.0.20:2000");
        assert_eq!(config.frequency_hz, 125_000_000);
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!(parse_device_spec("evg0").is_err());
        assert!(parse_device_spec("evg0@10.0.0.20:2000").is_err());
        assert!(parse_device_spec("evg0@10.0.0.20/125000000").is_err());
        assert!(parse_device_spec("evg0@nothost:2000/125000000").is_err());
        assert!(parse_device_spec("@10.0.0.20:2000/125000000").is_err());
    }
}
