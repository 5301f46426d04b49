use crate::game::ClientWorld;
use crate::input::InputManager;
use crate::rendering::{RenderConfig, Renderer};
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use macroquad::window::next_frame;
use shared::{Packet, MAX_PACKET_SIZE};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// UDP link to the authority, bridged to the frame loop through channels
pub struct Transport {
    socket: UdpSocket,
    server_addr: SocketAddr,
    fake_ping_ms: u64,
    outgoing: mpsc::UnboundedReceiver<Packet>,
    incoming: mpsc::UnboundedSender<Packet>,
}

impl Transport {
    pub async fn bind(
        server_addr: SocketAddr,
        fake_ping_ms: u64,
        outgoing: mpsc::UnboundedReceiver<Packet>,
        incoming: mpsc::UnboundedSender<Packet>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        info!("Client socket bound to {}", socket.local_addr()?);

        Ok(Transport {
            socket,
            server_addr,
            fake_ping_ms,
            outgoing,
            incoming,
        })
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Runs until the frame loop drops its sender
    pub async fn run(mut self) {
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => {
                                    if self.incoming.send(packet).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                packet = self.outgoing.recv() => {
                    match packet {
                        Some(packet) => {
                            if let Err(e) = self.send_packet(&packet).await {
                                error!("Error sending packet: {}", e);
                            }
                        }
                        None => break,
                    }
                },
            }
        }

        info!("Transport stopped");
    }
}

/// Frame loop tying the replica, input and rendering together
pub struct Client {
    world: ClientWorld,
    incoming: mpsc::UnboundedReceiver<Packet>,
    input_manager: InputManager,
    renderer: Renderer,
    fake_ping_ms: u64,
}

impl Client {
    pub fn new(
        world: ClientWorld,
        incoming: mpsc::UnboundedReceiver<Packet>,
        fake_ping_ms: u64,
        width: usize,
        height: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Client {
            world,
            incoming,
            input_manager: InputManager::new(),
            renderer: Renderer::new(width, height)?,
            fake_ping_ms,
        })
    }

    fn drain_incoming(&mut self) {
        while let Ok(packet) = self.incoming.try_recv() {
            self.world.handle_packet(packet);
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.world.connect();

        loop {
            self.drain_incoming();

            let controls = self.input_manager.update(self.world.actions());
            if controls.reconnect {
                info!("Reconnecting...");
                self.world.disconnect();
                self.world.connect();
            }
            if controls.cycle_possession {
                if let Some(pawn) = self.world.cycle_possession() {
                    info!("Switching to pawn {}", pawn);
                }
            }
            if controls.release {
                self.world.unpossess();
            }

            self.world.send_update();

            self.renderer.render(
                &self.world,
                RenderConfig {
                    fake_ping_ms: self.fake_ping_ms,
                },
            );

            if macroquad::input::is_key_pressed(macroquad::input::KeyCode::Escape) {
                break;
            }

            next_frame().await;
        }

        self.world.disconnect();
        Ok(())
    }
}
