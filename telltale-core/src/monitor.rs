//! Monitor context
//!
//! Owns the channel table, the persisted record and the clock, and is
//! threaded through the scheduler loop. Each tick runs one read pass and
//! then one alarm pass, so alarms always see the values read in the same
//! tick.

use telltale_hal::{Clock, NvStorage};

use crate::channel::{ChannelId, ChannelManager, ConfigError};
use crate::config::MAX_CHANNELS;
use crate::persist::{ChannelStore, PersistError};
use crate::registry::Registries;
use crate::traits::SensorPort;

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    /// Channels read this tick
    pub reads: usize,
    /// Channels with the alarm flag set after evaluation
    pub active_alarms: usize,
}

/// Channel table plus its storage and time source
pub struct Monitor<'r, S, C, const N: usize = MAX_CHANNELS> {
    channels: ChannelManager<'r, N>,
    store: ChannelStore<S>,
    clock: C,
}

impl<'r, S: NvStorage, C: Clock, const N: usize> Monitor<'r, S, C, N> {
    /// Create a monitor with an empty channel table
    pub fn new(registries: &'r Registries, storage: S, clock: C) -> Self {
        Self {
            channels: ChannelManager::new(registries),
            store: ChannelStore::new(storage),
            clock,
        }
    }

    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    pub fn channels(&self) -> &ChannelManager<'r, N> {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelManager<'r, N> {
        &mut self.channels
    }

    pub fn store(&self) -> &ChannelStore<S> {
        &self.store
    }

    /// Load the stored configuration
    ///
    /// Never fails: a missing, corrupt or unreadable record leaves the
    /// table empty. Returns the number of channels loaded.
    pub fn boot(&mut self) -> usize {
        let now = self.clock.now_ms();
        match self.store.load(&mut self.channels, now) {
            Ok(count) => count,
            Err(PersistError::SchemaMismatch) => {
                info!("starting with no channels configured");
                0
            }
            Err(PersistError::Corrupted) => {
                warn!("stored configuration discarded");
                0
            }
            Err(PersistError::Storage(_e)) => {
                error!("storage read failed: {}", _e);
                0
            }
        }
    }

    /// One scheduler tick: read due channels, then evaluate every alarm
    pub fn tick(&mut self, port: &mut dyn SensorPort) -> TickReport {
        let now = self.clock.now_ms();
        let reads = self.channels.read_all_channels(port, now);
        self.channels.evaluate_alarms(now);
        TickReport {
            reads,
            active_alarms: self.channels.iter().filter(|c| c.alarm_active()).count(),
        }
    }

    /// Bind `id` to an application at the current time
    pub fn bind_application(
        &mut self,
        id: ChannelId,
        application: u8,
        port: &mut dyn SensorPort,
    ) -> Result<(), ConfigError> {
        let now = self.clock.now_ms();
        self.channels.bind_application(id, application, now, port)
    }

    /// Persist the enabled channels
    pub fn save(&mut self) -> Result<u8, PersistError> {
        self.store.save(&self.channels)
    }

    /// Clear the table and invalidate the stored record
    pub fn reset(&mut self) -> Result<(), PersistError> {
        self.store.reset(&mut self.channels)
    }

    /// Give back the storage device and clock
    pub fn release(self) -> (S, C) {
        (self.store.into_storage(), self.clock)
    }
}
