use std::sync::Arc;
use std::thread;
use std::{env, error::Error};

use roadlink::core::{Controller, DropAddress};
use roadlink::{DeviceRequest, DmsPoller, G4Poller, LinkConfig, LinkWorker, Poller, Protocol, Ss125Poller};
use roadlink_testing::MockController;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: poll_link <link.toml> <drop_address>...");
        println!();
        println!("link.toml holds a single link table: name, protocol, uri and optional timings");
        println!("Each device is polled at its poll period; run with RUST_LOG=roadlink=debug to watch");
        return Ok(());
    }

    let config = LinkConfig::load(&args[1])?;
    let drops = args[2..].iter().map(|arg| arg.parse::<u16>()).collect::<Result<Vec<_>, _>>()?;
    let devices: Vec<Arc<MockController>> = drops
        .into_iter()
        .map(|drop| Arc::new(MockController::new(format!("{}_{}", config.name, drop), DropAddress(drop))))
        .collect();
    let period = devices.iter().map(|device| device.poll_period()).min().unwrap_or_default();

    let handle = LinkWorker::from_config(&config)?.spawn()?;
    println!("Polling {} devices on {} ({})", devices.len(), config.uri, config.protocol);

    let dms = DmsPoller::new(handle.queue(), config.retry_policy());
    let sensor: Box<dyn Poller<dyn Controller>> = match config.protocol {
        Protocol::G4 => Box::new(G4Poller::new(handle.queue(), config.retry_policy())),
        _ => Box::new(Ss125Poller::new(handle.queue(), config.retry_policy())),
    };

    for device in &devices {
        if config.protocol == Protocol::DmsXml {
            let _ = dms.send_request(device, DeviceRequest::QueryConfiguration);
        } else {
            let controller: Arc<dyn Controller> = device.clone();
            let _ = sensor.send_request(&controller, DeviceRequest::SendSettings);
        }
    }

    loop {
        for device in &devices {
            if config.protocol == Protocol::DmsXml {
                let _ = dms.poll(device);
            } else {
                let controller: Arc<dyn Controller> = device.clone();
                let _ = sensor.poll(&controller);
            }
            for call in device.take_calls() {
                println!("{}: {:?}", device.name(), call);
            }
        }
        thread::sleep(period);
    }
}
