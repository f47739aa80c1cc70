use hidlink_lib::service;
use hidlink_lib::{ConnectionSupervisor, LinkConfig, SystemPorts};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = LinkConfig::default();
    println!("Looking for a bridge on \"{}\"...", config.port_description);

    let supervisor = ConnectionSupervisor::new(SystemPorts, (), config);
    let (handle, task) = service::spawn(supervisor);
    handle.wait_ready(Duration::from_secs(10)).await?;
    println!("Connected!\n");

    match handle.device_config().await? {
        Some(info) => {
            println!("============================================================");
            println!("BRIDGE PARAMETERS");
            println!("============================================================");
            println!("Mode:               {:#04x}", info.mode);
            println!("Serial mode:        {:#04x}", info.serial_mode);
            println!("Address:            {:#04x}", info.address);
            println!("Baud rate:          {}", info.baud_rate);
            println!("Packet interval:    {} ms", info.packet_interval_ms);
            println!("USB VID:PID:        {:04x}:{:04x}", info.vid, info.pid);
            println!("USB string flags:   {:#04x}", info.usb_string_flags);
            println!();
            println!("Raw block:          {}", hex::encode(info.as_block()));
            println!();
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        None => println!("Bridge is ready but reported no parameters"),
    }

    handle.shutdown().await;
    task.await?;
    Ok(())
}
