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

use eyre::{Context, bail};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thicket_common::{Session, SessionError, ThingId, ThingType};
use thicket_db::{Account, AccountError, AccountStore, FjallWorldStore};
use thicket_kernel::{World, game_client};
use tokio::net::TcpStream;
use tokio::select;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

pub const WELCOME: &str =
    "Welcome to thicket. Type \"connect <name> <password>\" or \"create <name> <password>\".";
pub const LOGIN_USAGE: &str = "Use \"connect <name> <password>\" or \"create <name> <password>\".";
pub const BAD_LOGIN: &str = "Either that account doesn't exist, or that password is wrong.";

/// Output from the game thread, in the order it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Output {
    Line(String),
    Disconnect,
}

/// The world's handle on a connection: every line goes over a channel to the connection's
/// writer task.
pub(crate) struct ChannelSession {
    output: flume::Sender<Output>,
}

impl ChannelSession {
    pub(crate) fn new(output: flume::Sender<Output>) -> Self {
        Self { output }
    }
}

impl Session for ChannelSession {
    fn send_text(&self, text: &str) -> Result<(), SessionError> {
        self.output
            .send(Output::Line(text.to_string()))
            .map_err(|_| SessionError::Disconnected)
    }

    fn disconnect(&self) -> Result<(), SessionError> {
        self.output
            .send(Output::Disconnect)
            .map_err(|_| SessionError::Disconnected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LoginRequest {
    Connect { name: String, password: String },
    Create { name: String, password: String },
}

/// `connect <name> <password>` or `create <name> <password>`. The password is everything after
/// the name, so it may contain spaces.
pub(crate) fn parse_login(line: &str) -> Option<LoginRequest> {
    let mut words = line.trim().splitn(3, char::is_whitespace);
    let verb = words.next()?.to_lowercase();
    let name = words.next()?.trim().to_string();
    let password = words.next()?.trim().to_string();
    if name.is_empty() || password.is_empty() {
        return None;
    }
    match verb.as_str() {
        "connect" | "co" => Some(LoginRequest::Connect { name, password }),
        "create" | "cr" => Some(LoginRequest::Create { name, password }),
        _ => None,
    }
}

pub(crate) struct TelnetConnection {
    pub(crate) peer_addr: SocketAddr,
    pub(crate) world: Arc<World>,
    pub(crate) accounts: Arc<FjallWorldStore>,
    pub(crate) start: ThingId,
    pub(crate) write: SplitSink<Framed<TcpStream, LinesCodec>, String>,
    pub(crate) read: SplitStream<Framed<TcpStream, LinesCodec>>,
}

impl TelnetConnection {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        world: Arc<World>,
        accounts: Arc<FjallWorldStore>,
        start: ThingId,
    ) -> Self {
        let (write, read) = Framed::new(stream, LinesCodec::new()).split();
        Self {
            peer_addr,
            world,
            accounts,
            start,
            write,
            read,
        }
    }

    pub(crate) async fn run(mut self) -> Result<(), eyre::Error> {
        self.write.send(WELCOME.to_string()).await?;
        let Some((account, created)) = self.authorization_phase().await? else {
            debug!(peer_addr = ?self.peer_addr, "Closed before logging in");
            return Ok(());
        };
        let connect_message = if created {
            "*** Created ***"
        } else {
            "*** Connected ***"
        };
        self.write.send(connect_message.to_string()).await?;

        info!(peer_addr = ?self.peer_addr, login = %account.login_name, "Entering command loop");
        self.command_loop(account).await
    }

    /// Read login lines until one succeeds. None if the client hangs up first.
    async fn authorization_phase(&mut self) -> Result<Option<(Account, bool)>, eyre::Error> {
        while let Some(line) = self.read.next().await {
            let line = line.with_context(|| "Unable to read from client")?;
            let Some(request) = parse_login(&line) else {
                self.write.send(LOGIN_USAGE.to_string()).await?;
                continue;
            };
            match self.login(request).await? {
                Ok(login) => return Ok(Some(login)),
                Err(message) => self.write.send(message).await?,
            }
        }
        Ok(None)
    }

    /// The account and whether it was just created, or a message for the client.
    async fn login(
        &self,
        request: LoginRequest,
    ) -> Result<Result<(Account, bool), String>, eyre::Error> {
        let world = self.world.clone();
        let accounts = self.accounts.clone();
        let start = self.start;
        // Password hashing and the store are both blocking.
        let result = tokio::task::spawn_blocking(move || match request {
            LoginRequest::Connect { name, password } => {
                match accounts.account_for_login(&name, &password) {
                    Ok(account) => Ok((account, false)),
                    Err(AccountError::NoSuchAccount | AccountError::BadPassword) => {
                        Err(BAD_LOGIN.to_string())
                    }
                    Err(e) => {
                        warn!(%name, "Login failed: {e}");
                        Err(e.to_string())
                    }
                }
            }
            LoginRequest::Create { name, password } => {
                // Held until the account is written, so a second `create` of the same name
                // fails before making a player.
                let reservation = accounts.reserve_login(&name).map_err(|e| e.to_string())?;
                let player = world
                    .create_thing(&name, ThingType::Player, None, start)
                    .map_err(|e| e.to_string())?;
                match reservation.create_account(&password, player.id) {
                    Ok(account) => Ok((account, true)),
                    Err(e) => {
                        warn!(%name, player = ?player.id, "Player created without an account: {e}");
                        Err(e.to_string())
                    }
                }
            }
        })
        .await?;
        Ok(result)
    }

    /// Run the game on its own thread, feeding it input lines and writing back its output
    /// until either side is done.
    async fn command_loop(mut self, account: Account) -> Result<(), eyre::Error> {
        let (input_send, input_receive) = flume::unbounded::<String>();
        let (output_send, output_receive) = flume::unbounded::<Output>();
        let session = Arc::new(ChannelSession::new(output_send));

        let world = self.world.clone();
        let login = account.login_name.clone();
        let game = std::thread::Builder::new()
            .name(format!("thicket-game-{login}"))
            .spawn(move || game_client(world, session, &account, input_receive))?;

        loop {
            select! {
                line = self.read.next() => {
                    match line {
                        Some(Ok(line)) => {
                            if input_send.send(line).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(peer_addr = ?self.peer_addr, "Read failed: {e}");
                            break;
                        }
                        None => {
                            info!(peer_addr = ?self.peer_addr, "Connection closed");
                            break;
                        }
                    }
                }
                output = output_receive.recv_async() => {
                    match output {
                        Ok(Output::Line(text)) => {
                            self.write.send(text).await.with_context(|| "Unable to send message to client")?;
                        }
                        Ok(Output::Disconnect) | Err(_) => {
                            self.write.close().await?;
                            break;
                        }
                    }
                }
            }
        }

        // Hanging up the input ends the game loop if it hasn't ended already.
        drop(input_send);
        match tokio::task::spawn_blocking(move || game.join()).await? {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => bail!("Game session for {login} failed: {e}"),
            Err(_) => bail!("Game thread for {login} panicked"),
        }
    }
}
