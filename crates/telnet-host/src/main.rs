// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use eyre::eyre;
use thicket_db::FjallWorldStore;
use thicket_kernel::World;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

use crate::args::Args;

mod args;
mod connection;
mod listen;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), eyre::Error> {
    color_eyre::install()?;
    let args: Args = Args::parse();

    thicket_common::tracing::init_tracing(args.debug)
        .map_err(|e| eyre!("Unable to configure logging: {}", e))?;

    let config = args.load_config()?;
    std::fs::create_dir_all(&args.data_dir)?;
    let db_path = args.resolved_db_path();
    let (store, fresh) = FjallWorldStore::open(Some(&db_path), &config.database)?;
    info!(?db_path, fresh, "World database open");
    let store = Arc::new(store);
    let world = Arc::new(World::new(store.clone(), config.world.clone()));
    let start = listen::starting_place(&world, store.as_ref())?;

    let mut hup_signal = signal(SignalKind::hangup())?;
    let mut stop_signal = signal(SignalKind::interrupt())?;

    let telnet_sockaddr = args.listen_address.parse::<SocketAddr>()?;
    let listen_loop = listen::telnet_listen_loop(telnet_sockaddr, world.clone(), store, start);

    info!("Host started, listening @ {}...", args.listen_address);
    select! {
        msg = listen_loop => {
            if let Err(e) = msg {
                warn!("Listen loop exited: {e}");
            }
        }
        _ = hup_signal.recv() => {
            info!("HUP received, stopping...");
        },
        _ = stop_signal.recv() => {
            info!("STOP received, stopping...");
        }
    }

    world.checkpoint()?;
    info!("Done.");
    Ok(())
}
