//! Server network layer handling UDP communications and the authority's event loop

use crate::authority::Authority;
use crate::config::ServerConfig;
use crate::participants::ParticipantManager;
use crate::spawner::RetryTicket;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, ParticipantId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network and timer tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ParticipantTimeout {
        participant: ParticipantId,
        addr: SocketAddr,
    },
    OrphanRetry(RetryTicket),
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the authority to the network sender task
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        to: ParticipantId,
    },
    /// For connections that never became participants
    SendToAddr {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<ParticipantId>,
    },
}

/// Main server coordinating networking and the authority
pub struct Server {
    socket: Arc<UdpSocket>,
    participants: Arc<RwLock<ParticipantManager>>,
    authority: Authority,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let addr = config.bind_addr();
        let socket = Arc::new(UdpSocket::bind(&addr).await?);
        info!("Server listening on {}", addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let participants = ParticipantManager::new(config.max_clients, config.client_timeout);
        let tick_duration = config.tick_duration;
        let authority = Authority::new(config, game_tx.clone(), server_tx.clone());

        Ok(Server {
            socket,
            participants: Arc::new(RwLock::new(participants)),
            authority,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let participants = Arc::clone(&self.participants);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, to } => {
                        let addr = participants.read().await.addr_of(to);
                        match addr {
                            Some(addr) => {
                                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await
                                {
                                    error!("Failed to send packet to {}: {}", to, e);
                                }
                            }
                            None => debug!("Dropping packet for departed participant {}", to),
                        }
                    }
                    GameMessage::SendToAddr { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let addrs = participants.read().await.addrs();

                        for (participant, addr) in addrs {
                            if Some(participant) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to participant {}: {}", participant, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors participant timeouts
    async fn spawn_timeout_checker(&self) {
        let participants = Arc::clone(&self.participants);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = participants.write().await.check_timeouts();

                for (participant, addr) in timed_out {
                    if let Err(e) =
                        server_tx.send(ServerMessage::ParticipantTimeout { participant, addr })
                    {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_to_addr(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendToAddr { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to(&self, packet: Packet, to: ParticipantId) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, to }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Processes incoming packets; connection management stays here, the
    /// rest goes to the authority
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                resume,
            } => {
                info!(
                    "Participant connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_to_addr(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                let existing = self.participants.read().await.find_by_addr(addr);
                if let Some(existing) = existing {
                    info!("Removing existing participant {} from {}", existing, addr);
                    self.participants.write().await.remove_participant(&existing);
                    self.authority.on_participant_left(existing);
                }

                let admitted = self.participants.write().await.add_participant(addr, resume);

                match admitted {
                    Some(participant) => {
                        self.send_to(
                            Packet::Connected {
                                client_id: participant,
                            },
                            participant,
                        );
                        self.authority.on_participant_joined(participant);
                    }
                    None => {
                        self.send_to_addr(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Disconnect => {
                let participant = self.participants.read().await.find_by_addr(addr);

                if let Some(participant) = participant {
                    self.participants
                        .write()
                        .await
                        .remove_participant(&participant);
                    self.authority.on_participant_left(participant);
                }
            }

            packet if packet.is_from_authority() => {
                warn!("Dropping authority-only packet from {}", addr);
            }

            packet => {
                let mut participants = self.participants.write().await;
                let Some(participant) = participants.find_by_addr(addr) else {
                    warn!("Packet from unknown address {}", addr);
                    return;
                };

                match &packet {
                    Packet::PawnInput { pawn, sequence, .. } => {
                        let accepted = participants
                            .get_mut(participant)
                            .map(|entry| entry.accept_input(*pawn, *sequence))
                            .unwrap_or(false);
                        if !accepted {
                            return;
                        }
                    }
                    Packet::SceneLoaded { scene } => {
                        if let Some(entry) = participants.get_mut(participant) {
                            entry.scene = Some(scene.clone());
                        }
                        participants.touch(participant);
                    }
                    _ => participants.touch(participant),
                }
                drop(participants);

                self.authority.handle_packet(participant, packet);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ParticipantTimeout { participant, addr }) => {
                            info!("Participant {} timed out", participant);
                            self.send_to_addr(
                                Packet::Disconnected {
                                    reason: "timeout".to_string(),
                                },
                                addr,
                            );
                            self.authority.on_participant_left(participant);
                        },
                        Some(ServerMessage::OrphanRetry(ticket)) => {
                            let outcome = self.authority.retry_orphan(ticket);
                            debug!("Orphan retry {:?}: {:?}", ticket, outcome);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.authority.tick(dt);

                    if self.authority.world().tick % 60 == 0 {
                        let participant_count = self.participants.read().await.len();
                        if participant_count > 0 {
                            debug!(
                                "Tick {}: {} participants, {} pawns, {:.1}Hz",
                                self.authority.world().tick,
                                participant_count,
                                self.authority.world().pawns.len(),
                                1.0 / dt
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
