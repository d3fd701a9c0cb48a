//! Address supervisor built on top of [`AddressManager`].
//!
//! It keeps the claiming state-machine alive and optionally offers:
//!
//! * a transmission handle (`AddressHandle`) to queue frames/PGNs;
//! * a frame receiver (`AddressFrames`) to pull application traffic filtered by the manager.
//!
//! The host task decides which features it needs by requesting bounded
//! `tokio::sync::mpsc` channels of the desired capacity. This Service/Handle/Runner
//! split is the same shape the router core (`crate::router`) uses for every
//! coupler and publisher: a cheap, cloneable handle for producers, and a
//! runner that owns the actual I/O and is driven by a single task.

use std::fmt::Debug;

use tokio::sync::mpsc;

use crate::error::{ClaimError, SendPgnError};
use crate::infra::codec::traits::PgnData;
use crate::protocol::managment::address_manager::AddressManager;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::fast_packet::MAX_FAST_PACKET_PAYLOAD;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::korri_timer::KorriTimer;

/// Service assembling the supervisor components.
pub struct AddressService<C: CanBus, T: KorriTimer>
where
    C::Error: Debug,
{
    manager: AddressManager<C, T>,
    command_channel: Option<(mpsc::Sender<SupervisorCommand>, mpsc::Receiver<SupervisorCommand>)>,
    frame_channel: Option<(mpsc::Sender<CanFrame>, mpsc::Receiver<CanFrame>)>,
}

impl<C, T> AddressService<C, T>
where
    C: CanBus,
    C::Error: Debug,
    T: KorriTimer,
{
    /// Wrap an already-initialised [`AddressManager`]. Pass `Some(capacity)` for
    /// whichever channel the host task actually needs.
    pub fn new(manager: AddressManager<C, T>, cmd_capacity: Option<usize>, frame_capacity: Option<usize>) -> Self {
        Self {
            manager,
            command_channel: cmd_capacity.map(mpsc::channel),
            frame_channel: frame_capacity.map(mpsc::channel),
        }
    }

    /// Convenience helper: claim an address then build the service.
    pub async fn claim(
        can_bus: C,
        timer: T,
        my_name: u64,
        preferred_address: u8,
        cmd_capacity: Option<usize>,
        frame_capacity: Option<usize>,
    ) -> Result<Self, ClaimError<C::Error>> {
        let manager = AddressManager::new(can_bus, timer, my_name, preferred_address).await?;
        Ok(Self::new(manager, cmd_capacity, frame_capacity))
    }

    /// Split into handle/receiver/runner components.
    pub fn into_parts(self) -> AddressServiceParts<C, T> {
        let (handle, command_rx) = match self.command_channel {
            Some((tx, rx)) => (Some(AddressHandle { sender: tx }), Some(rx)),
            None => (None, None),
        };
        let (frames, frame_tx) = match self.frame_channel {
            Some((tx, rx)) => (Some(AddressFrames { receiver: rx }), Some(tx)),
            None => (None, None),
        };
        AddressServiceParts {
            handle,
            frames,
            runner: AddressRunner {
                manager: self.manager,
                command_rx,
                frame_tx,
            },
        }
    }
}

/// Bundle returned by [`AddressService::into_parts`].
pub struct AddressServiceParts<C, T>
where
    C: CanBus,
    C::Error: Debug,
    T: KorriTimer,
{
    pub handle: Option<AddressHandle>,
    pub frames: Option<AddressFrames>,
    pub runner: AddressRunner<C, T>,
}

/// Runner that drives the supervisor loop. Meant to be spawned as its own task.
pub struct AddressRunner<C, T>
where
    C: CanBus,
    C::Error: Debug,
    T: KorriTimer,
{
    manager: AddressManager<C, T>,
    command_rx: Option<mpsc::Receiver<SupervisorCommand>>,
    frame_tx: Option<mpsc::Sender<CanFrame>>,
}

impl<C, T> AddressRunner<C, T>
where
    C: CanBus,
    C::Error: Debug,
    T: KorriTimer,
{
    pub async fn drive(mut self) -> Result<(), AddressSupervisorRunError<C::Error>> {
        loop {
            match &mut self.command_rx {
                Some(cmd_rx) => {
                    tokio::select! {
                        result = self.manager.recv() => {
                            match result {
                                Ok(Some(frame)) => {
                                    if let Some(frame_tx) = &self.frame_tx {
                                        let _ = frame_tx.send(frame).await;
                                    }
                                }
                                Ok(None) => {}
                                Err(err) => return Err(AddressSupervisorRunError::Receive(err)),
                            }
                        }
                        command = cmd_rx.recv() => {
                            match command {
                                Some(command) => handle_command(&mut self.manager, command).await?,
                                // Every handle was dropped: keep draining frames only.
                                None => self.command_rx = None,
                            }
                        }
                    }
                }
                None => {
                    let result = self.manager.recv().await;
                    match result {
                        Ok(Some(frame)) => {
                            if let Some(frame_tx) = &self.frame_tx {
                                let _ = frame_tx.send(frame).await;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => return Err(AddressSupervisorRunError::Receive(err)),
                    }
                }
            }
        }
    }
}

/// Transmission handle (optional). Cheap to clone; every clone enqueues into
/// the same bounded channel the runner drains.
#[derive(Clone)]
pub struct AddressHandle {
    sender: mpsc::Sender<SupervisorCommand>,
}

impl AddressHandle {
    pub async fn send_frame(&self, frame: &CanFrame) {
        let command = SupervisorCommand::SendFrame(frame.clone());
        let _ = self.sender.send(command).await;
    }

    pub async fn send_pgn<P: PgnData>(
        &self,
        pgn_data: &P,
        pgn: u32,
        priority: u8,
        destination: Option<u8>,
    ) -> Result<(), AddressHandleError> {
        let mut buffer = [0u8; MAX_FAST_PACKET_PAYLOAD];
        let len = pgn_data
            .to_payload(&mut buffer)
            .map_err(|_| AddressHandleError::Serialization)?;

        let mut payload = [0u8; MAX_FAST_PACKET_PAYLOAD];
        payload[..len].copy_from_slice(&buffer[..len]);

        let command = SupervisorCommand::SendPayload {
            pgn,
            priority,
            destination,
            len,
            payload,
        };

        let _ = self.sender.send(command).await;
        Ok(())
    }
}

/// Optional receiver returning application frames filtered by the supervisor.
pub struct AddressFrames {
    receiver: mpsc::Receiver<CanFrame>,
}

impl AddressFrames {
    /// Returns `None` once the runner has shut down and every sender is dropped.
    pub async fn recv(&mut self) -> Option<CanFrame> {
        self.receiver.recv().await
    }
}

/// Commands queued by producer tasks.
#[derive(Clone)]
pub enum SupervisorCommand {
    SendFrame(CanFrame),
    SendPayload {
        pgn: u32,
        priority: u8,
        destination: Option<u8>,
        len: usize,
        payload: [u8; MAX_FAST_PACKET_PAYLOAD],
    },
}

#[derive(Debug)]
pub enum AddressHandleError {
    Serialization,
}

#[derive(Debug)]
pub enum AddressSupervisorRunError<E: Debug> {
    Receive(E),
    Send(E),
    SendPgn(SendPgnError<E>),
}

async fn handle_command<C: CanBus, T: KorriTimer>(
    manager: &mut AddressManager<C, T>,
    command: SupervisorCommand,
) -> Result<(), AddressSupervisorRunError<C::Error>>
where
    C::Error: Debug,
{
    match command {
        SupervisorCommand::SendFrame(frame) => manager
            .send(&frame)
            .await
            .map_err(AddressSupervisorRunError::Send),
        SupervisorCommand::SendPayload {
            pgn,
            priority,
            destination,
            len,
            payload,
        } => manager
            .send_payload(pgn, priority, destination, &payload[..len])
            .await
            .map_err(AddressSupervisorRunError::SendPgn),
    }
}
