use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use hidlink_lib::discovery::{find_device_port, list_ports};
use hidlink_lib::message::UsbStringKind;
use hidlink_lib::service::{self, LinkHandle};
use hidlink_lib::{
    ChannelSink, Command, ConnectionSupervisor, LinkConfig, LinkError, LinkEvent, MouseButtons, SystemPorts,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Drive a CH9329-class USB HID bridge over its serial port.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with link settings; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the serial port description used to find the bridge.
    #[arg(short, long)]
    port_description: Option<String>,
    /// Seconds to wait for the bridge to become ready.
    #[arg(long, default_value_t = 10)]
    ready_timeout: u64,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports and mark the one matching the bridge description
    Ports,
    /// Keep the link up and print events until Ctrl-C
    Monitor,
    /// Send one mouse report
    #[command(subcommand)]
    Mouse(MouseAction),
    /// Close and reopen the link
    Reset,
    /// Restore the chip's factory parameters
    FactoryReset,
    /// Reopen the bridge at another line rate
    Baud { rate: u32 },
    /// Replace one of the chip's USB string descriptors
    UsbString {
        #[arg(value_enum)]
        kind: StringKind,
        text: String,
    },
    /// Change the USB vendor and product IDs the chip enumerates with
    UsbIds {
        /// Vendor ID in hex, e.g. 1a86
        #[arg(value_parser = parse_hex_u16)]
        vid: u16,
        /// Product ID in hex, e.g. e129
        #[arg(value_parser = parse_hex_u16)]
        pid: u16,
        /// Custom string descriptor flags: bit 0 serial, 1 product, 2 manufacturer, 7 enable
        #[arg(long, value_parser = parse_hex_u8)]
        string_flags: Option<u8>,
    },
}

fn parse_hex_u16(value: &str) -> Result<u16, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value {:?}: {}", value, e))
}

fn parse_hex_u8(value: &str) -> Result<u8, String> {
    let digits = value.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value {:?}: {}", value, e))
}

#[derive(Subcommand, Debug)]
enum MouseAction {
    /// Move to an absolute position in 0..=4095 screen space
    Absolute {
        x: u16,
        y: u16,
        /// Button mask: 1 left, 2 right, 4 middle, 8 back, 16 forward
        #[arg(short, long, default_value_t = 0)]
        buttons: u8,
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        wheel: i32,
    },
    /// Move by a relative offset
    Relative {
        #[arg(allow_negative_numbers = true)]
        dx: i32,
        #[arg(allow_negative_numbers = true)]
        dy: i32,
        #[arg(short, long, default_value_t = 0)]
        buttons: u8,
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        wheel: i32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StringKind {
    Manufacturer,
    Product,
    Serial,
}

impl From<StringKind> for UsbStringKind {
    fn from(kind: StringKind) -> Self {
        match kind {
            StringKind::Manufacturer => UsbStringKind::Manufacturer,
            StringKind::Product => UsbStringKind::Product,
            StringKind::Serial => UsbStringKind::SerialNumber,
        }
    }
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn load_config(cli: &Cli) -> Result<LinkConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => LinkConfig::from_json_file(path)?,
        None => LinkConfig::default(),
    };
    if let Some(description) = &cli.port_description {
        config = config.with_port_description(description.clone());
    }
    Ok(config)
}

struct Session {
    handle: LinkHandle,
    task: JoinHandle<()>,
    events: UnboundedReceiver<LinkEvent>,
}

impl Session {
    async fn start(config: LinkConfig, ready_timeout: Duration) -> Result<Self, Box<dyn Error>> {
        if find_device_port(&SystemPorts, &config.port_description).is_none() {
            return Err(LinkError::DeviceNotFound.into());
        }
        let (sink, events) = ChannelSink::new();
        let supervisor = ConnectionSupervisor::new(SystemPorts, sink, config);
        let (handle, task) = service::spawn(supervisor);
        info!("Waiting for the bridge...");
        handle.wait_ready(ready_timeout).await?;
        Ok(Self { handle, task, events })
    }

    async fn finish(self) -> Result<(), Box<dyn Error>> {
        self.handle.shutdown().await;
        self.task.await?;
        Ok(())
    }
}

fn print_ports(config: &LinkConfig) {
    let ports = list_ports(&SystemPorts);
    if ports.is_empty() {
        println!("No serial ports found.");
        return;
    }
    for port in ports {
        let marker = if port.description.as_deref() == Some(config.port_description.as_str()) {
            "*"
        } else {
            " "
        };
        let ids = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{:04x}:{:04x}", vid, pid),
            _ => "----:----".to_string(),
        };
        println!(
            "{} {:<20} {}  {}",
            marker,
            port.name,
            ids,
            port.description.as_deref().unwrap_or("<no description>")
        );
    }
}

async fn monitor(mut session: Session) -> Result<(), Box<dyn Error>> {
    println!("Monitoring, press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = session.events.recv() => match event {
                Some(LinkEvent::PortConnected(port)) => println!("port: {}", port),
                Some(LinkEvent::DataReceived(data)) => println!("rx:   {}", hex::encode(&data)),
                Some(LinkEvent::DeviceConfig(config)) => println!("cfg:  {}", serde_json::to_string(&config)?),
                None => break,
            },
        }
    }
    session.finish().await
}

async fn execute(handle: &LinkHandle, command: Commands) -> Result<(), Box<dyn Error>> {
    match command {
        Commands::Ports | Commands::Monitor => {}
        Commands::Mouse(MouseAction::Absolute { x, y, buttons, wheel }) => {
            let sent = handle
                .absolute_mouse_action(x, y, MouseButtons::from_mask(buttons), wheel)
                .await;
            report("Absolute mouse move", sent);
        }
        Commands::Mouse(MouseAction::Relative { dx, dy, buttons, wheel }) => {
            let sent = handle
                .relative_mouse_action(dx, dy, MouseButtons::from_mask(buttons), wheel)
                .await;
            report("Relative mouse move", sent);
        }
        Commands::Reset => {
            handle.reset().await?;
            println!("Link reset");
        }
        Commands::FactoryReset => {
            let sent = handle.factory_reset().await?;
            report("Factory reset", sent);
        }
        Commands::Baud { rate } => {
            handle.change_baud_rate(rate).await?;
            let state = handle.state().await?;
            println!("Reopened at {} baud, link {}", rate, state);
        }
        Commands::UsbString { kind, text } => {
            let sent = handle.send(&Command::usb_string(kind.into(), text), false).await;
            report("USB string update", sent);
        }
        Commands::UsbIds { vid, pid, string_flags } => {
            let Some(mut config) = handle.device_config().await? else {
                warn!("No parameter block read from the bridge yet");
                return Ok(());
            };
            config = config.with_usb_ids(vid, pid);
            if let Some(flags) = string_flags {
                config = config.with_usb_string_flags(flags);
            }
            let sent = handle.apply_config(config).await?;
            report("USB ID update", sent);
            if sent {
                println!("The bridge re-enumerates as {:04x}:{:04x}", vid, pid);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);
    let config = load_config(&cli)?;
    let ready_timeout = Duration::from_secs(cli.ready_timeout);

    match cli.command {
        Commands::Ports => print_ports(&config),
        Commands::Monitor => monitor(Session::start(config, ready_timeout).await?).await?,
        command => {
            let session = Session::start(config, ready_timeout).await?;
            execute(&session.handle, command).await?;
            // Give the bridge a moment to acknowledge before closing the port
            tokio::time::sleep(Duration::from_millis(200)).await;
            session.finish().await?;
        }
    }
    Ok(())
}

fn report(what: &str, sent: bool) {
    if sent {
        println!("{} sent", what);
    } else {
        warn!("{} was not sent, link not ready", what);
    }
}
