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

use thicket_common::{ThingId, ThingType};
use thicket_db::{FjallWorldStore, WorldStore};
use thicket_kernel::World;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::connection::TelnetConnection;

pub const DEFAULT_START_NAME: &str = "Lobby";

/// Where new players are put: the first place at the top of the world, made if there is none.
pub fn starting_place(world: &World, store: &dyn WorldStore) -> Result<ThingId, eyre::Report> {
    for id in store.children_of(ThingId::ROOT)? {
        if let Some(thing) = world.thing_for_id(id) {
            if thing.thing_type == ThingType::Place {
                return Ok(thing.id);
            }
        }
    }
    let lobby = world.create_thing(DEFAULT_START_NAME, ThingType::Place, None, ThingId::ROOT)?;
    info!(place = ?lobby.id, "Created starting place");
    Ok(lobby.id)
}

pub async fn telnet_listen_loop(
    telnet_sockaddr: SocketAddr,
    world: Arc<World>,
    store: Arc<FjallWorldStore>,
    start: ThingId,
) -> Result<(), eyre::Error> {
    let listener = TcpListener::bind(telnet_sockaddr).await?;
    info!("Listening @ {}", telnet_sockaddr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        info!(?peer_addr, "Accepted connection");
        let connection =
            TelnetConnection::new(stream, peer_addr, world.clone(), store.clone(), start);

        // One task per connection.
        tokio::spawn(async move {
            if let Err(e) = connection.run().await {
                warn!(?peer_addr, "Connection ended with an error: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thicket_db::DatabaseConfig;

    #[test]
    fn starting_place_is_made_once() {
        let (store, fresh) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        assert!(fresh);
        let store = Arc::new(store);
        let world = World::new(store.clone(), Default::default());

        let lobby = starting_place(&world, store.as_ref()).unwrap();
        assert_eq!(world.thing_for_id(lobby).unwrap().name, DEFAULT_START_NAME);
        assert_eq!(starting_place(&world, store.as_ref()).unwrap(), lobby);
    }

    #[test]
    fn existing_places_are_preferred() {
        let (store, _) = FjallWorldStore::open(None, &DatabaseConfig::default()).unwrap();
        let store = Arc::new(store);
        let world = World::new(store.clone(), Default::default());
        world
            .create_thing("rock", ThingType::Regular, None, ThingId::ROOT)
            .unwrap();
        let plaza = world
            .create_thing("Plaza", ThingType::Place, None, ThingId::ROOT)
            .unwrap();
        assert_eq!(starting_place(&world, store.as_ref()).unwrap(), plaza.id);
    }
}
