//! Connection sessions and protocol dispatch
//!
//! One session per accepted TCP connection: a writer task drains the
//! connection's outbound line queue, the read loop decodes each inbound
//! line and dispatches it, and a liveness prober runs beside both. Every
//! way a session can end (QUIT, end of stream, read error, write failure,
//! missed pong) funnels into the same cleanup path.
//!
//! Lock discipline: the registry lock is always taken before the lobby
//! lock, and every broadcast snapshots its recipient senders while the
//! locks are held, releases them, then sends.

use crate::board::BoardLayout;
use crate::highscore::{HighscoreSink, MemoryHighscore};
use crate::liveness::{self, LivenessProbe, ProbeConfig};
use crate::lobby::{GameProgress, Lobby, LobbyManager, LobbyState};
use crate::registry::{OutboundSender, Registry};
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    is_valid_nickname, sanitize_text, DiceColor, Message, Verb, DEFAULT_LOBBY, DICE_PER_ROLL,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};

/// The shared services every session works against.
///
/// Constructed once at startup and handed to each session, so nothing in
/// the server is process-global state.
pub struct Services {
    pub registry: Arc<RwLock<Registry>>,
    pub lobbies: Arc<RwLock<LobbyManager>>,
    pub highscore: Arc<StdMutex<dyn HighscoreSink>>,
    pub probe: ProbeConfig,
}

impl Services {
    pub fn new(layout: Arc<BoardLayout>, probe: ProbeConfig) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::new())),
            lobbies: Arc::new(RwLock::new(LobbyManager::new(layout))),
            highscore: Arc::new(StdMutex::new(MemoryHighscore::new())),
            probe,
        }
    }

    pub fn with_highscore(mut self, sink: Arc<StdMutex<dyn HighscoreSink>>) -> Self {
        self.highscore = sink;
        self
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Handles one accepted connection until it closes.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, services: Arc<Services>) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer task: sole owner of the write half. A failed write is an
    // implicit disconnect; the read loop notices the closed socket.
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let data = format!("{}\n", line);
            if let Err(e) = write_half.write_all(data.as_bytes()).await {
                debug!("Write failed, peer likely gone: {}", e);
                break;
            }
        }
    });

    let probe = liveness::spawn(tx.clone(), peer.to_string(), services.probe);
    let shutdown = probe.shutdown_signal();

    let mut session = Session {
        services,
        tx,
        peer,
        user_id: None,
    };

    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                info!("Closing {} after liveness timeout", peer);
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match session.handle_line(&line, &probe).await {
                        Flow::Continue => {}
                        Flow::Quit => break,
                    }
                }
                Ok(None) => {
                    debug!("Connection {} reached end of stream", peer);
                    break;
                }
                Err(e) => {
                    warn!("Read error on {}: {}", peer, e);
                    break;
                }
            }
        }
    }

    probe.abort();
    session.cleanup().await;
    // Dropping the session drops the last queue sender; the writer flushes
    // whatever is left (e.g. the QCNF reply) and exits.
    drop(session);
    let _ = writer.await;
    info!("Session {} closed", peer);
}

struct Session {
    services: Arc<Services>,
    tx: OutboundSender,
    peer: SocketAddr,
    user_id: Option<u32>,
}

/// Snapshots the senders of a lobby's members, optionally excluding one.
fn lobby_recipients(registry: &Registry, lobby: &Lobby, exclude: Option<u32>) -> Vec<OutboundSender> {
    lobby
        .players()
        .iter()
        .filter(|&&p| Some(p) != exclude)
        .filter_map(|&p| registry.sender_of(p))
        .collect()
}

fn fanout(recipients: &[OutboundSender], line: &str) {
    for recipient in recipients {
        let _ = recipient.send(line.to_string());
    }
}

impl Session {
    fn send(&self, msg: Message) {
        let _ = self.tx.send(msg.encode());
    }

    fn send_info(&self, text: impl Into<String>) {
        self.send(Message::with_payload(Verb::Info, text.into()));
    }

    async fn handle_line(&mut self, line: &str, probe: &LivenessProbe) -> Flow {
        let msg = match Message::decode(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping malformed line from {}: {}", self.peer, e);
                return Flow::Continue;
            }
        };
        let payload = msg.payload.as_deref().unwrap_or("");

        match msg.verb {
            Verb::Ping => self.send(Message::bare(Verb::Pong)),
            Verb::Pong => probe.pong(),
            Verb::Quit => {
                self.send(Message::bare(Verb::Qcnf));
                return Flow::Quit;
            }
            Verb::Join if self.user_id.is_none() => self.register(payload).await,
            _ if self.user_id.is_none() => {
                self.send_info("register a nickname first (JOIN%name)")
            }
            Verb::Join => self.join_lobby(payload).await,
            Verb::Nick => self.rename(payload).await,
            Verb::Chat => self.chat(payload).await,
            Verb::Brod => self.shout(payload).await,
            Verb::Wisp => self.whisper(&msg).await,
            Verb::Crlo => self.create_lobby(payload).await,
            Verb::Velo => self.choose_color(payload).await,
            Verb::Rady => self.ready().await,
            Verb::Strt => self.start_game().await,
            Verb::Rstt => self.restart_game().await,
            Verb::Roll => self.roll().await,
            Verb::Chos => self.select_field(payload).await,
            Verb::Deos => self.deselect_field(payload).await,
            Verb::Move => self.commit_move().await,
            Verb::Next => self.end_turn().await,
            Verb::List => self.list_users().await,
            Verb::Lome => self.list_lobby().await,
            Verb::Glst => self.game_state().await,
            Verb::High => self.highscores(),
            Verb::Winn | Verb::Fnsh | Verb::Info | Verb::Qcnf => {
                debug!("Ignoring server-only verb {} from {}", msg.verb, self.peer);
            }
        }
        Flow::Continue
    }

    /// JOIN before registration: claim a nickname and enter the default
    /// lobby. Collisions are resolved with a numeric suffix; the reply
    /// carries the name actually assigned.
    async fn register(&mut self, requested: &str) {
        if !is_valid_nickname(requested) {
            self.send_info("nicknames are 3-15 letters, digits, '_' or '-'");
            return;
        }

        let (id, assigned, peers) = {
            let mut registry = self.services.registry.write().await;
            let mut lobbies = self.services.lobbies.write().await;
            let (id, assigned) = registry.register(requested, self.tx.clone());
            lobbies.add_user(id);
            let peers = lobbies
                .get(DEFAULT_LOBBY)
                .map(|l| lobby_recipients(&registry, l, Some(id)))
                .unwrap_or_default();
            (id, assigned, peers)
        };

        self.user_id = Some(id);
        self.send(Message::with_payload(Verb::Join, assigned.clone()));
        let notice =
            Message::with_payload(Verb::Info, format!("{} joined the server", assigned)).encode();
        fanout(&peers, &notice);
    }

    /// JOIN after registration: move into the named lobby. Joining the
    /// default lobby is how a user leaves their current group.
    async fn join_lobby(&mut self, name: &str) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            match lobbies.join(name, id) {
                Ok(()) => {
                    let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                    let peers = lobbies
                        .get(name)
                        .map(|l| lobby_recipients(&registry, l, None))
                        .unwrap_or_default();
                    Ok((nick, peers))
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok((nick, peers)) => {
                let notice = Message::two_part(Verb::Join, &nick, name).encode();
                fanout(&peers, &notice);
            }
            Err(reason) => self.send_info(reason),
        }
    }

    async fn rename(&mut self, new_name: &str) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let mut registry = self.services.registry.write().await;
            match registry.rename(id, new_name) {
                Ok((old, new)) => {
                    let everyone: Vec<OutboundSender> =
                        registry.users().map(|u| u.sender.clone()).collect();
                    Ok((old, new, everyone))
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok((old, new, everyone)) => {
                let notice = Message::two_part(Verb::Nick, &old, &new).encode();
                fanout(&everyone, &notice);
            }
            Err(reason) => self.send_info(reason),
        }
    }

    /// CHAT goes to the sender's lobby members only, excluding the sender.
    async fn chat(&mut self, text: &str) {
        let Some(id) = self.user_id else { return };
        let text = sanitize_text(text);
        if text.trim().is_empty() {
            self.send_info("nothing to send");
            return;
        }

        let (nick, peers) = {
            let registry = self.services.registry.read().await;
            let lobbies = self.services.lobbies.read().await;
            let nick = registry.nickname_of(id).unwrap_or_default().to_string();
            let peers = lobbies
                .lobby_of(id)
                .map(|l| lobby_recipients(&registry, l, Some(id)))
                .unwrap_or_default();
            (nick, peers)
        };

        let line = Message::two_part(Verb::Chat, &nick, &text).encode();
        fanout(&peers, &line);
    }

    /// BROD reaches every connected user regardless of lobby.
    async fn shout(&mut self, text: &str) {
        let Some(id) = self.user_id else { return };
        let text = sanitize_text(text);
        if text.trim().is_empty() {
            self.send_info("nothing to send");
            return;
        }

        let (nick, everyone) = {
            let registry = self.services.registry.read().await;
            let nick = registry.nickname_of(id).unwrap_or_default().to_string();
            let everyone: Vec<OutboundSender> = registry
                .users()
                .filter(|u| u.id != id)
                .map(|u| u.sender.clone())
                .collect();
            (nick, everyone)
        };

        let line = Message::two_part(Verb::Brod, &nick, &text).encode();
        fanout(&everyone, &line);
    }

    /// WISP delivers to exactly one named recipient.
    async fn whisper(&mut self, msg: &Message) {
        let Some(id) = self.user_id else { return };
        let Some((to, text)) = msg.split_payload() else {
            self.send_info("usage: WISP%nickname%message");
            return;
        };
        let text = sanitize_text(text);

        let outcome = {
            let registry = self.services.registry.read().await;
            let nick = registry.nickname_of(id).unwrap_or_default().to_string();
            registry.sender_of_name(to).map(|target| (nick, target))
        };

        match outcome {
            Some((nick, target)) => {
                let _ = target.send(Message::two_part(Verb::Wisp, &nick, &text).encode());
            }
            None => self.send_info(format!("no user named '{}'", to)),
        }
    }

    async fn create_lobby(&mut self, name: &str) {
        let Some(id) = self.user_id else { return };
        if !is_valid_nickname(name) {
            self.send_info("lobby names are 3-15 letters, digits, '_' or '-'");
            return;
        }

        let outcome = {
            let mut lobbies = self.services.lobbies.write().await;
            let grouped = lobbies
                .lobby_of(id)
                .map(|l| !l.is_default())
                .unwrap_or(false);
            if grouped {
                Err("leave your current lobby first (JOIN%Welcome)".to_string())
            } else if let Err(e) = lobbies.create(name) {
                Err(e.to_string())
            } else if let Err(e) = lobbies.join(name, id) {
                Err(e.to_string())
            } else {
                Ok(())
            }
        };

        match outcome {
            Ok(()) => self.send(Message::with_payload(Verb::Crlo, name)),
            Err(reason) => self.send_info(reason),
        }
    }

    /// VELO picks a bike color from the dice palette; a color already
    /// claimed by a lobby mate is rejected.
    async fn choose_color(&mut self, color_name: &str) {
        let Some(id) = self.user_id else { return };
        let Some(color) = DiceColor::parse(color_name) else {
            self.send_info(format!("unknown color '{}'", color_name));
            return;
        };

        let outcome = {
            let mut registry = self.services.registry.write().await;
            let lobbies = self.services.lobbies.read().await;
            let taken = lobbies.lobby_of(id).is_some_and(|lobby| {
                lobby
                    .players()
                    .iter()
                    .any(|&p| p != id && registry.bike_color_of(p) == Some(color))
            });
            if taken {
                Err(format!("{} is already taken in your lobby", color))
            } else {
                registry.set_bike_color(id, color);
                let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                let peers = lobbies
                    .lobby_of(id)
                    .map(|l| lobby_recipients(&registry, l, None))
                    .unwrap_or_default();
                Ok((nick, peers))
            }
        };

        match outcome {
            Ok((nick, peers)) => {
                let line = Message::two_part(Verb::Velo, &nick, color.as_str()).encode();
                fanout(&peers, &line);
            }
            Err(reason) => self.send_info(reason),
        }
    }

    async fn ready(&mut self) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            match lobbies.lobby_of_mut(id) {
                Some(lobby) => {
                    lobby.set_ready(id);
                    let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                    let peers = lobby_recipients(&registry, lobby, None);
                    let all_ready = lobby.all_ready();
                    Some((nick, peers, all_ready))
                }
                None => None,
            }
        };

        if let Some((nick, peers, all_ready)) = outcome {
            fanout(&peers, &Message::with_payload(Verb::Rady, nick).encode());
            if all_ready {
                fanout(
                    &peers,
                    &Message::with_payload(Verb::Info, "all players are ready").encode(),
                );
            }
        }
    }

    async fn start_game(&mut self) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            match lobbies.start_game(id) {
                Ok(lobby) => {
                    let name = lobby.name().to_string();
                    let peers = lobby_recipients(&registry, lobby, None);
                    Ok((name, peers))
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok((name, peers)) => {
                fanout(&peers, &Message::with_payload(Verb::Strt, name).encode());
            }
            Err(reason) => self.send_info(reason),
        }
    }

    async fn restart_game(&mut self) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            match lobbies.restart_game(id) {
                Ok(lobby) => {
                    let name = lobby.name().to_string();
                    let peers = lobby_recipients(&registry, lobby, None);
                    Ok((name, peers))
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok((name, peers)) => {
                fanout(&peers, &Message::with_payload(Verb::Rstt, name).encode());
            }
            Err(reason) => self.send_info(reason),
        }
    }

    /// ROLL fills the player's credit table with random dice colors. One
    /// roll per turn; the result is broadcast to the whole lobby.
    async fn roll(&mut self) {
        let Some(id) = self.user_id else { return };

        let colors: Vec<DiceColor> = {
            let mut rng = rand::thread_rng();
            (0..DICE_PER_ROLL)
                .map(|_| DiceColor::ALL[rng.gen_range(0..DiceColor::ALL.len())])
                .collect()
        };

        let outcome = {
            let mut registry = self.services.registry.write().await;
            let mut lobbies = self.services.lobbies.write().await;
            let Some(lobby) = lobbies.lobby_of_mut(id) else {
                self.send_info("you are not in a game lobby");
                return;
            };
            if lobby.state() == LobbyState::Running
                && lobby.current_player() == Some(id)
                && registry.has_rolled(id)
            {
                Err("you already rolled this turn".to_string())
            } else {
                match lobby.apply_roll(id, &colors) {
                    Ok(()) => {
                        registry.mark_rolled(id);
                        let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                        let peers = lobby_recipients(&registry, lobby, None);
                        Ok((nick, peers))
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        match outcome {
            Ok((nick, peers)) => {
                let rolled = colors
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                let line = Message::two_part(Verb::Roll, &nick, &rolled).encode();
                fanout(&peers, &line);
            }
            Err(reason) => self.send_info(reason),
        }
    }

    async fn select_field(&mut self, field: &str) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            if !registry.has_rolled(id) {
                Err("roll the dice first".to_string())
            } else {
                let Some(lobby) = lobbies.lobby_of_mut(id) else {
                    self.send_info("you are not in a game lobby");
                    return;
                };
                match lobby.select_field(id, field) {
                    Ok(_color) => {
                        let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                        let peers = lobby_recipients(&registry, lobby, None);
                        Ok((nick, peers))
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        match outcome {
            Ok((nick, peers)) => {
                let line = Message::two_part(Verb::Chos, &nick, field).encode();
                fanout(&peers, &line);
            }
            Err(reason) => self.send_info(reason),
        }
    }

    async fn deselect_field(&mut self, field: &str) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            let Some(lobby) = lobbies.lobby_of_mut(id) else {
                self.send_info("you are not in a game lobby");
                return;
            };
            match lobby.deselect_field(id, field) {
                Ok(_color) => {
                    let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                    let peers = lobby_recipients(&registry, lobby, None);
                    Ok((nick, peers))
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok((nick, peers)) => {
                let line = Message::two_part(Verb::Deos, &nick, field).encode();
                fanout(&peers, &line);
            }
            Err(reason) => self.send_info(reason),
        }
    }

    /// MOVE commits the pending selection. Landing on the finish field
    /// records a winner; when that decides the race, the lobby finishes
    /// and the result goes to the highscore sink.
    async fn commit_move(&mut self) {
        let Some(id) = self.user_id else { return };

        // (recipients, encoded line) pairs queued under the locks and sent
        // after both guards are released.
        let mut queued: Vec<(Vec<OutboundSender>, String)> = Vec::new();
        let mut error: Option<String> = None;

        {
            let registry = self.services.registry.read().await;
            let mut lobbies = self.services.lobbies.write().await;
            let layout = lobbies.layout();
            match lobbies.lobby_of_mut(id) {
                Some(lobby) => match lobby.commit_move(id) {
                    Ok(field) => {
                        let nick = registry.nickname_of(id).unwrap_or_default().to_string();
                        let peers = lobby_recipients(&registry, lobby, None);
                        queued.push((
                            peers.clone(),
                            Message::two_part(Verb::Move, &nick, &field).encode(),
                        ));

                        if layout.is_finish(&field) {
                            queued.push((
                                peers.clone(),
                                Message::with_payload(Verb::Winn, nick).encode(),
                            ));
                            if let GameProgress::Finished { final_order } = lobby.add_winner(id) {
                                let lobby_name = lobby.name().to_string();
                                let podium: Vec<String> = final_order
                                    .iter()
                                    .map(|&w| {
                                        registry.nickname_of(w).unwrap_or_default().to_string()
                                    })
                                    .collect();
                                queued.push((
                                    peers,
                                    Message::two_part(Verb::Fnsh, &lobby_name, &podium.join(","))
                                        .encode(),
                                ));
                                if let Ok(mut sink) = self.services.highscore.lock() {
                                    sink.append_result(&lobby_name, &podium);
                                }
                            }
                        }
                    }
                    Err(e) => error = Some(e.to_string()),
                },
                None => error = Some("you are not in a game lobby".to_string()),
            }
        }

        match error {
            Some(reason) => self.send_info(reason),
            None => {
                for (peers, line) in queued {
                    fanout(&peers, &line);
                }
            }
        }
    }

    /// NEXT ends the turn: pending credits are dropped, the roll flag is
    /// cleared and the turn rotates past any winners.
    async fn end_turn(&mut self) {
        let Some(id) = self.user_id else { return };

        let outcome = {
            let mut registry = self.services.registry.write().await;
            let mut lobbies = self.services.lobbies.write().await;
            let Some(lobby) = lobbies.lobby_of_mut(id) else {
                self.send_info("you are not in a game lobby");
                return;
            };
            match lobby.end_turn(id) {
                Ok(next) => {
                    registry.clear_rolled(id);
                    let next_nick = next
                        .and_then(|n| registry.nickname_of(n))
                        .unwrap_or_default()
                        .to_string();
                    let peers = lobby_recipients(&registry, lobby, None);
                    Ok((next_nick, peers))
                }
                Err(e) => Err(e.to_string()),
            }
        };

        match outcome {
            Ok((next_nick, peers)) => {
                fanout(&peers, &Message::with_payload(Verb::Next, next_nick).encode());
            }
            Err(reason) => self.send_info(reason),
        }
    }

    async fn list_users(&mut self) {
        let names = {
            let registry = self.services.registry.read().await;
            registry.nicknames().join(",")
        };
        self.send(Message::with_payload(Verb::List, names));
    }

    async fn list_lobby(&mut self) {
        let Some(id) = self.user_id else { return };

        let reply = {
            let registry = self.services.registry.read().await;
            let lobbies = self.services.lobbies.read().await;
            lobbies.lobby_of(id).map(|lobby| {
                let members: Vec<&str> = lobby
                    .players()
                    .iter()
                    .filter_map(|&p| registry.nickname_of(p))
                    .collect();
                Message::two_part(Verb::Lome, lobby.name(), &members.join(","))
            })
        };

        match reply {
            Some(msg) => self.send(msg),
            None => self.send_info("you are not in a lobby"),
        }
    }

    async fn game_state(&mut self) {
        let Some(id) = self.user_id else { return };

        let reply = {
            let registry = self.services.registry.read().await;
            let lobbies = self.services.lobbies.read().await;
            lobbies.lobby_of(id).map(|lobby| {
                let snapshot = lobby.game_snapshot(|p| {
                    registry.nickname_of(p).unwrap_or_default().to_string()
                });
                let positions: Vec<String> = snapshot
                    .positions
                    .iter()
                    .map(|(nick, field)| format!("{}={}", nick, field))
                    .collect();
                let detail = format!(
                    "{};turn={};{}",
                    snapshot.state,
                    snapshot.current_player.as_deref().unwrap_or("-"),
                    positions.join(",")
                );
                Message::two_part(Verb::Glst, &snapshot.lobby, &detail)
            })
        };

        match reply {
            Some(msg) => self.send(msg),
            None => self.send_info("you are not in a lobby"),
        }
    }

    fn highscores(&mut self) {
        let rows = match self.services.highscore.lock() {
            Ok(sink) => sink.entries().join(";"),
            Err(_) => String::new(),
        };
        self.send(Message::with_payload(Verb::High, rows));
    }

    /// Common teardown for QUIT, end of stream and liveness timeout:
    /// registry entry removed, lobby membership cleaned up, remaining
    /// members notified.
    async fn cleanup(&mut self) {
        let Some(id) = self.user_id.take() else { return };

        let mut queued: Vec<(Vec<OutboundSender>, String)> = Vec::new();
        {
            let mut registry = self.services.registry.write().await;
            let mut lobbies = self.services.lobbies.write().await;
            let nick = registry
                .remove(id)
                .map(|u| u.nickname)
                .unwrap_or_default();

            if let Some(lobby_name) = lobbies.remove_player(id) {
                if let Some(lobby) = lobbies.get(&lobby_name) {
                    let peers = lobby_recipients(&registry, lobby, None);
                    queued.push((
                        peers.clone(),
                        Message::with_payload(Verb::Info, format!("{} left the game", nick))
                            .encode(),
                    ));
                    // Keep a running game moving if the leaver held the turn
                    if lobby.state() == LobbyState::Running {
                        if let Some(current) = lobby.current_player() {
                            let current_nick =
                                registry.nickname_of(current).unwrap_or_default().to_string();
                            queued.push((
                                peers,
                                Message::with_payload(Verb::Next, current_nick).encode(),
                            ));
                        }
                    }
                }
            }
            info!("Cleaned up user {} ('{}') on {}", id, nick, self.peer);
        }

        for (peers, line) in queued {
            fanout(&peers, &line);
        }
    }
}
