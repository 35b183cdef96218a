use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use log::{debug, trace, warn};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use consts::{
    CONNECT_ATTEMPTS, CONNECT_RETRY_DELAY_SECS, CONNECT_STABILIZE_SECS, DEFAULT_MTU, POOL_STAGING_THRESHOLD,
    RESPONSE_WAIT_TIMEOUT_SECS, TOKEN_ACQUIRE_ACTIVE_TIMEOUT_SECS,
};

use crate::address::BluetoothAddress;
use crate::arbiter::{Arbiter, Token};
use crate::error::{Error, Result};
use crate::memory_pool::MemoryPool;
use crate::receive_buffer::ReceiveBuffer;

/// `DeviceSession`'s connection lifecycle. `Connected` is the only state in which
/// writes may proceed; `Connecting` permits only internal connect retries, external
/// callers observe [`Error::Busy`] for any operation attempted mid-connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// One notification pushed by the subscribed response characteristic.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub uuid: Uuid,
    pub bytes: Vec<u8>,
}

/// Owns connection lifecycle, GATT service/characteristic lookup, notification
/// subscription, and a thread-safe receive buffer for one BLE peripheral.
///
/// Exclusive owner of its GATT handles; shared only with the one worker that created
/// it (it is `Send + Sync` for convenience, but the spec's concurrency model has a
/// single owning worker plus the notification callback touching this type).
pub struct DeviceSession {
    address: BluetoothAddress,
    peripheral: Peripheral,
    arbiter: Arbiter,
    state: StdMutex<ConnectionState>,
    current_service: StdMutex<Option<Uuid>>,
    command_char: StdMutex<Option<Characteristic>>,
    response_char: StdMutex<Option<Characteristic>>,
    receive_buffer: Arc<ReceiveBuffer>,
    token: StdMutex<Option<Token>>,
    communication_in_progress: AtomicBool,
    waiting_for_notification: AtomicBool,
    notify: Notify,
    notification_task: StdMutex<Option<JoinHandle<()>>>,
    notification_tx: broadcast::Sender<NotificationEvent>,
}

impl DeviceSession {
    pub fn new(address: BluetoothAddress, peripheral: Peripheral, arbiter: Arbiter, pool: MemoryPool) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        DeviceSession {
            address,
            peripheral,
            arbiter,
            state: StdMutex::new(ConnectionState::Disconnected),
            current_service: StdMutex::new(None),
            command_char: StdMutex::new(None),
            response_char: StdMutex::new(None),
            receive_buffer: Arc::new(ReceiveBuffer::new(pool)),
            token: StdMutex::new(None),
            communication_in_progress: AtomicBool::new(false),
            waiting_for_notification: AtomicBool::new(false),
            notify: Notify::new(),
            notification_task: StdMutex::new(None),
            notification_tx: tx,
        }
    }

    pub fn address(&self) -> BluetoothAddress {
        self.address
    }

    pub fn receive_buffer(&self) -> &ReceiveBuffer {
        &self.receive_buffer
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Default MTU assumed for notification-boundary detection. `btleplug` does not
    /// expose a portable MTU query, so (per the expanded spec's resolution of this gap)
    /// the session always reports the default rather than guessing from the transport.
    pub fn mtu(&self) -> usize {
        DEFAULT_MTU
    }

    /// Subscribe to notification events forwarded from the response characteristic.
    pub fn notifications(&self) -> broadcast::Receiver<NotificationEvent> {
        self.notification_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Resolves the device, connects with up to [`CONNECT_ATTEMPTS`] retries (1s apart,
    /// each followed by a 2s stabilisation delay), then acquires a token bound to this
    /// session. Token acquisition uses the 120s "active session" timeout.
    pub async fn open(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);

        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.peripheral.connect().await {
                Ok(()) => {
                    sleep(Duration::from_secs(CONNECT_STABILIZE_SECS)).await;
                    last_err = None;
                    break;
                }
                Err(err) => {
                    warn!("connect attempt {attempt}/{CONNECT_ATTEMPTS} to {} failed: {err}", self.address);
                    last_err = Some(err);
                    if attempt < CONNECT_ATTEMPTS {
                        sleep(Duration::from_secs(CONNECT_RETRY_DELAY_SECS)).await;
                    }
                }
            }
        }
        if last_err.is_some() {
            self.set_state(ConnectionState::Disconnected);
            return Err(Error::ConnectionFailed { attempts: CONNECT_ATTEMPTS });
        }

        let token = self
            .arbiter
            .acquire(Duration::from_secs(TOKEN_ACQUIRE_ACTIVE_TIMEOUT_SECS))
            .await
            .map_err(|e| {
                self.set_state(ConnectionState::Disconnected);
                e
            })?;
        *self.token.lock().unwrap() = Some(token);
        self.set_state(ConnectionState::Connected);
        debug!("session {} connected and bound to a token", self.address);
        Ok(())
    }

    /// Disconnects (errors swallowed), always returns the token if held, then drains
    /// the receive buffer.
    pub async fn close(&self) {
        self.set_state(ConnectionState::Closing);
        if self.peripheral.is_connected().await.unwrap_or(false) {
            if let Err(err) = self.peripheral.disconnect().await {
                warn!("disconnect from {} failed (ignored): {err}", self.address);
            }
        }
        if let Some(handle) = self.notification_task.lock().unwrap().take() {
            handle.abort();
        }
        let token = self.token.lock().unwrap().take();
        if let Some(token) = token {
            if let Err(err) = self.arbiter.release(token).await {
                warn!("releasing token for {} failed: {err}", self.address);
            }
        }
        self.receive_buffer.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    fn busy_if_in_progress(&self) -> Result<()> {
        if self.communication_in_progress.load(Ordering::Acquire) {
            return Err(Error::Busy);
        }
        Ok(())
    }

    /// Idempotent under an identical uuid; rejects with `Busy` mid-communication.
    pub async fn set_service(&self, uuid: Uuid) -> Result<()> {
        self.busy_if_in_progress()?;
        if *self.current_service.lock().unwrap() == Some(uuid) {
            return Ok(());
        }
        self.peripheral.discover_services().await?;
        let found = self.peripheral.services().into_iter().any(|s| s.uuid == uuid);
        if !found {
            return Err(Error::ServiceNotFound { uuid });
        }
        *self.current_service.lock().unwrap() = Some(uuid);
        Ok(())
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(Error::CharacteristicNotFound { uuid })
    }

    /// Idempotent under an identical uuid; rejects with `Busy` mid-communication.
    pub async fn set_command_characteristic(&self, uuid: Uuid) -> Result<()> {
        self.busy_if_in_progress()?;
        {
            let current = self.command_char.lock().unwrap();
            if current.as_ref().map(|c| c.uuid) == Some(uuid) {
                return Ok(());
            }
        }
        let characteristic = self.find_characteristic(uuid)?;
        *self.command_char.lock().unwrap() = Some(characteristic);
        Ok(())
    }

    /// Subscribes the response characteristic and starts forwarding value-changed
    /// events into the receive buffer and to [`Self::notifications`] subscribers.
    /// Idempotent under an identical uuid; rejects with `Busy` mid-communication.
    pub async fn set_notifications(&self, uuid: Uuid) -> Result<()> {
        self.busy_if_in_progress()?;
        {
            let current = self.response_char.lock().unwrap();
            if current.as_ref().map(|c| c.uuid) == Some(uuid) && self.notification_task.lock().unwrap().is_some() {
                return Ok(());
            }
        }
        let characteristic = self.find_characteristic(uuid)?;
        self.peripheral.subscribe(&characteristic).await?;
        *self.response_char.lock().unwrap() = Some(characteristic.clone());

        if let Some(old) = self.notification_task.lock().unwrap().take() {
            old.abort();
        }
        let mut stream = self.peripheral.notifications().await?;
        let buffer_pool_threshold = POOL_STAGING_THRESHOLD;
        let buffer = Arc::clone(&self.receive_buffer);
        let tx = self.notification_tx.clone();
        let expected_uuid = characteristic.uuid;
        let task = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if event.uuid != expected_uuid {
                    continue;
                }
                trace!("notification on {}: {} byte(s)", event.uuid, event.value.len());
                if event.value.len() > buffer_pool_threshold {
                    buffer.append_large(&event.value);
                } else {
                    buffer.append(&event.value);
                }
                // A closed channel just means no one is listening right now (e.g.
                // between protocol calls); that's not an error for this task.
                let _ = tx.send(NotificationEvent { uuid: event.uuid, bytes: event.value });
            }
        });
        *self.notification_task.lock().unwrap() = Some(task);
        Ok(())
    }

    /// Preconditions: command characteristic set, connected (reconnects once if not),
    /// not already mid-write. Clears the buffer, writes, and optionally blocks for a
    /// boundary signal from the protocol engine (see [`Self::stop_communication`]).
    pub async fn write_without_response(&self, bytes: &[u8], wait_for_notification: bool) -> Result<()> {
        let command_char = self.command_char.lock().unwrap().clone().ok_or_else(|| Error::invalid("command characteristic not set"))?;

        if !self.is_connected().await {
            self.reconnect_once().await?;
        }

        if self
            .communication_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }

        self.receive_buffer.clear();
        if wait_for_notification {
            self.waiting_for_notification.store(true, Ordering::Release);
        }

        if let Err(err) = self.peripheral.write(&command_char, bytes, WriteType::WithoutResponse).await {
            self.stop_communication();
            return Err(err.into());
        }

        if !wait_for_notification {
            self.stop_communication();
            return Ok(());
        }

        let wait = Duration::from_secs(RESPONSE_WAIT_TIMEOUT_SECS);
        tokio::select! {
            _ = self.notify.notified() => Ok(()),
            _ = sleep(wait) => {
                self.stop_communication();
                Err(Error::Timeout)
            }
        }
    }

    /// Clears both in-flight flags and wakes any waiter. Safe to call repeatedly: the
    /// underlying `Notify` stores at most one pending permit.
    pub fn stop_communication(&self) {
        self.waiting_for_notification.store(false, Ordering::Release);
        self.communication_in_progress.store(false, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_waiting_for_notification(&self) -> bool {
        self.waiting_for_notification.load(Ordering::Acquire)
    }

    async fn reconnect_once(&self) -> Result<()> {
        self.peripheral.connect().await.map_err(|_| Error::ConnectionFailed { attempts: 1 })?;
        sleep(Duration::from_secs(CONNECT_STABILIZE_SECS)).await;
        Ok(())
    }

    /// Queries the underlying device; `false` if the address or adapter is unknown.
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }
}
