//! Peerglass server entrypoint.
//!
//! Loads the device inventory, wires up the component stack, and serves
//! the HTTP API.

use std::error::Error;
use std::net::SocketAddr;

use log::info;

use peerglass::inventory::Inventory;
use peerglass::{AppState, router};

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --inventory <file> [--listen <addr>]\n\n\
         --inventory points at the JSON device inventory (required).\n\
         --listen sets the bind address (default {DEFAULT_LISTEN})."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    inventory: Option<String>,
    listen: Option<String>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--inventory" => {
                if options.inventory.is_some() {
                    return Err(());
                }
                options.inventory = Some(args.next().ok_or(())?);
            }
            "--listen" => {
                if options.listen.is_some() {
                    return Err(());
                }
                options.listen = Some(args.next().ok_or(())?);
            }
            _ => return Err(()),
        }
    }

    if options.inventory.is_none() {
        return Err(());
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "peerglass".to_owned());

    let options = match parse_options(args) {
        Ok(options) => options,
        Err(()) => {
            print_usage(&program);
            std::process::exit(2);
        }
    };

    let inventory_path = options.inventory.as_deref().unwrap_or_default();
    let directory = Inventory::load(std::path::Path::new(inventory_path))?.into_shared();
    info!(
        "loaded inventory from {inventory_path}: {} active routers",
        directory.active_devices().len()
    );

    let listen: SocketAddr = options
        .listen
        .as_deref()
        .unwrap_or(DEFAULT_LISTEN)
        .parse()?;

    let app = router(AppState::new(directory));
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("listening on {listen}");
    axum::serve(listener, app).await?;

    Ok(())
}
