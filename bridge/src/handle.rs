//! Single-owner registry task.
//!
//! [`spawn_registry`] moves a [`PinRegistry`] into its own task. Everything
//! else talks to it through a cloneable [`RegistryHandle`], so reads,
//! read-compare-store sequences and hardware access are serialized by the
//! task's request queue.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::RegistryError;
use crate::pin::{PinMode, PinState};
use crate::registry::{PinRegistry, WriteOutcome};

const REQUEST_QUEUE: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, RegistryError>>;

enum Request {
    SetMode(String, PinMode, Reply<bool>),
    Update(String, i64, Reply<WriteOutcome>),
    Read(String, Reply<u8>),
    UpdateAll(i64, Reply<usize>),
    ApplyPattern(String, Reply<usize>),
    SetInvert(String, bool, Reply<()>),
    SetAllInvert(bool, Reply<()>),
    Reset(String, Reply<()>),
    ResetAll(Reply<()>),
    PollInput(String, Reply<Option<u8>>),
    InputPins(Reply<Vec<String>>),
    Snapshot(Reply<Vec<PinState>>),
}

/// Starts the registry task and returns a handle to it. The task ends when
/// the last handle is dropped.
pub fn spawn_registry(registry: PinRegistry) -> RegistryHandle {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
    tokio::spawn(run(registry, rx));
    RegistryHandle { tx }
}

async fn run(mut reg: PinRegistry, mut rx: mpsc::Receiver<Request>) {
    while let Some(req) = rx.recv().await {
        // A caller that gave up on its reply is not an error.
        match req {
            Request::SetMode(name, mode, reply) => {
                let _ = reply.send(reg.set_mode(&name, mode).await);
            }
            Request::Update(name, value, reply) => {
                let _ = reply.send(reg.update(&name, value).await);
            }
            Request::Read(name, reply) => {
                let _ = reply.send(reg.read(&name).await);
            }
            Request::UpdateAll(value, reply) => {
                let _ = reply.send(reg.update_all(value).await);
            }
            Request::ApplyPattern(bits, reply) => {
                let _ = reply.send(reg.apply_pattern(&bits).await);
            }
            Request::SetInvert(name, on, reply) => {
                let _ = reply.send(reg.set_invert(&name, on));
            }
            Request::SetAllInvert(on, reply) => {
                reg.set_all_invert(on);
                let _ = reply.send(Ok(()));
            }
            Request::Reset(name, reply) => {
                let _ = reply.send(reg.reset(&name).await);
            }
            Request::ResetAll(reply) => {
                reg.reset_all().await;
                let _ = reply.send(Ok(()));
            }
            Request::PollInput(name, reply) => {
                let _ = reply.send(reg.poll_input(&name).await);
            }
            Request::InputPins(reply) => {
                let _ = reply.send(Ok(reg.input_pins()));
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(Ok(reg.snapshot()));
            }
        }
    }
    debug!("registry task stopped");
}

/// Cloneable access to the registry task. Methods mirror [`PinRegistry`].
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Request>,
}

impl RegistryHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| RegistryError::Closed)?;
        rx.await.map_err(|_| RegistryError::Closed)?
    }

    pub async fn set_mode(&self, name: &str, mode: PinMode) -> Result<bool, RegistryError> {
        let name = name.to_string();
        self.call(|r| Request::SetMode(name, mode, r)).await
    }

    pub async fn update(&self, name: &str, value: i64) -> Result<WriteOutcome, RegistryError> {
        let name = name.to_string();
        self.call(|r| Request::Update(name, value, r)).await
    }

    pub async fn read(&self, name: &str) -> Result<u8, RegistryError> {
        let name = name.to_string();
        self.call(|r| Request::Read(name, r)).await
    }

    pub async fn update_all(&self, value: i64) -> Result<usize, RegistryError> {
        self.call(|r| Request::UpdateAll(value, r)).await
    }

    pub async fn apply_pattern(&self, bits: &str) -> Result<usize, RegistryError> {
        let bits = bits.to_string();
        self.call(|r| Request::ApplyPattern(bits, r)).await
    }

    pub async fn set_invert(&self, name: &str, on: bool) -> Result<(), RegistryError> {
        let name = name.to_string();
        self.call(|r| Request::SetInvert(name, on, r)).await
    }

    pub async fn set_all_invert(&self, on: bool) -> Result<(), RegistryError> {
        self.call(|r| Request::SetAllInvert(on, r)).await
    }

    pub async fn reset(&self, name: &str) -> Result<(), RegistryError> {
        let name = name.to_string();
        self.call(|r| Request::Reset(name, r)).await
    }

    pub async fn reset_all(&self) -> Result<(), RegistryError> {
        self.call(Request::ResetAll).await
    }

    pub async fn poll_input(&self, name: &str) -> Result<Option<u8>, RegistryError> {
        let name = name.to_string();
        self.call(|r| Request::PollInput(name, r)).await
    }

    pub async fn input_pins(&self) -> Result<Vec<String>, RegistryError> {
        self.call(Request::InputPins).await
    }

    pub async fn snapshot(&self) -> Result<Vec<PinState>, RegistryError> {
        self.call(Request::Snapshot).await
    }
}
