//! Drive a sensor from the command line
//!
//! ```text
//! FINGERLINK_SENSOR_ADDR=192.168.1.40:2000 cargo run --example console -- enroll Alice
//! ```
//!
//! Commands: `enroll [name]`, `verify`, `delete [slot]`, `clear`, `count`,
//! `list`, `reconcile`.

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use fingerlink::transport::TcpTransport;
use fingerlink::{Config, ControllerBuilder, StreamEvent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| "count".to_string());
    let argument = args.next();

    let config = Config::from_env()?;
    let transport = TcpTransport::parse(&config.sensor_addr)?;
    let controller = ControllerBuilder::from_config(&config, Box::new(transport))?.build();

    let params = controller.connect().await.context("sensor handshake failed")?;
    println!("Connected: {}", params);

    let mut subscription = controller.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(status) = subscription.recv().await {
            let event = StreamEvent::from(&status);
            if let Ok(line) = serde_json::to_string(&event) {
                println!("event: {}", line);
            }
        }
    });

    match command.as_str() {
        "enroll" => {
            let status = controller.begin_enroll(argument.as_deref()).await?;
            println!("{}", status);
        }
        "verify" => {
            let status = controller.begin_verify().await?;
            println!("{}", status);
        }
        "delete" => {
            let slot = argument
                .map(|slot| slot.parse::<u16>())
                .transpose()
                .context("slot must be a number")?;
            let status = controller.begin_delete(slot).await?;
            println!("{}", status);
        }
        "clear" => {
            let status = controller.begin_clear().await?;
            println!("{}", status);
        }
        "count" => {
            let status = controller.sensor_status().await;
            println!("{}", status.message);
        }
        "list" => {
            for record in controller.list_templates() {
                println!("{}", record);
            }
        }
        "reconcile" => {
            let changes = controller.reconcile().await?;
            println!("added {:?}, removed {:?}", changes.added, changes.removed);
        }
        other => bail!("unknown command '{}'", other),
    }

    printer.abort();
    Ok(())
}
