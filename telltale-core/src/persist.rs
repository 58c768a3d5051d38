//! Channel table persistence
//!
//! Record layout (little endian):
//!
//! ```text
//! header  magic u32 | version u16 | count u8 | checksum u8
//! entry   id u8 | short name [8] | long name [32]
//!         app hash u16 | sensor hash u16 | units hash u16
//!         min f32 | max f32 | export id u8 | export len u8
//!         flags u8 | cal kind u8 | cal payload [16]
//! ```
//!
//! Registry references are stored as name hashes and resolved against the
//! current registries on load, so reordering a table between firmware
//! versions does not rebind channels. The checksum is the XOR of every entry
//! byte; the device gives no atomicity, so a mismatch discards the record.

use telltale_hal::{NvStorage, StorageError};

use crate::alarm::AlarmContext;
use crate::calibration::{Calibration, PAYLOAD_LEN};
use crate::channel::{bounded, Channel, ChannelId, ChannelManager, OutputMask};
use crate::config::{ENTRY_LEN, HEADER_LEN, LONG_NAME_LEN, MAGIC, SCHEMA_VERSION, SHORT_NAME_LEN, STORAGE_BASE};
use crate::registry::Registries;

const FLAG_ENABLED: u8 = 0x01;
const FLAG_ALARM: u8 = 0x02;
const FLAG_DISPLAY: u8 = 0x04;
const FLAG_CUSTOM_CAL: u8 = 0x08;
const OUTPUT_SHIFT: u8 = 4;

const SHORT_NAME_FIELD: usize = SHORT_NAME_LEN + 1;
const LONG_NAME_FIELD: usize = LONG_NAME_LEN + 1;

// Field offsets within an entry
const ID: usize = 0;
const SHORT_NAME: usize = ID + 1;
const LONG_NAME: usize = SHORT_NAME + SHORT_NAME_FIELD;
const APP_HASH: usize = LONG_NAME + LONG_NAME_FIELD;
const SENSOR_HASH: usize = APP_HASH + 2;
const UNITS_HASH: usize = SENSOR_HASH + 2;
const MIN: usize = UNITS_HASH + 2;
const MAX: usize = MIN + 4;
const EXPORT_ID: usize = MAX + 4;
const EXPORT_LEN: usize = EXPORT_ID + 1;
const FLAGS: usize = EXPORT_LEN + 1;
const CAL_KIND: usize = FLAGS + 1;
const CAL_PAYLOAD: usize = CAL_KIND + 1;

const _: () = assert!(CAL_PAYLOAD + PAYLOAD_LEN == ENTRY_LEN);

/// Persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PersistError {
    /// Magic or schema version mismatch; treated as no record
    SchemaMismatch,
    /// Checksum mismatch or undecodable entry
    Corrupted,
    /// Storage device error
    Storage(StorageError),
}

impl From<StorageError> for PersistError {
    fn from(e: StorageError) -> Self {
        PersistError::Storage(e)
    }
}

fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

fn put_name(field: &mut [u8], name: &str) {
    field.fill(0);
    let len = name.len().min(field.len() - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
}

fn get_name(field: &[u8]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..end]).ok()
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn f32_at(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn encode_entry(channel: &Channel, registries: &Registries) -> [u8; ENTRY_LEN] {
    let mut entry = [0u8; ENTRY_LEN];
    entry[ID] = channel.id.raw();
    put_name(&mut entry[SHORT_NAME..LONG_NAME], &channel.short_name);
    put_name(&mut entry[LONG_NAME..APP_HASH], &channel.long_name);
    entry[APP_HASH..SENSOR_HASH]
        .copy_from_slice(&registries.applications.hash_of(channel.application).to_le_bytes());
    entry[SENSOR_HASH..UNITS_HASH]
        .copy_from_slice(&registries.sensors.hash_of(channel.sensor).to_le_bytes());
    entry[UNITS_HASH..MIN].copy_from_slice(&registries.units.hash_of(channel.units).to_le_bytes());
    entry[MIN..MAX].copy_from_slice(&channel.alarm_min.to_le_bytes());
    entry[MAX..EXPORT_ID].copy_from_slice(&channel.alarm_max.to_le_bytes());
    entry[EXPORT_ID] = channel.export_id;
    entry[EXPORT_LEN] = channel.export_len;

    let mut flags = channel.outputs.bits() << OUTPUT_SHIFT;
    if channel.enabled {
        flags |= FLAG_ENABLED;
    }
    if channel.alarm_enabled {
        flags |= FLAG_ALARM;
    }
    if channel.display_enabled {
        flags |= FLAG_DISPLAY;
    }
    if let Some(custom) = &channel.custom_calibration {
        flags |= FLAG_CUSTOM_CAL;
        entry[CAL_PAYLOAD..].copy_from_slice(&custom.to_bytes());
    }
    entry[FLAGS] = flags;
    entry[CAL_KIND] = channel.calibration_kind as u8;
    entry
}

/// Rebuild a channel from an entry
///
/// Unknown hashes degrade to the sentinel (units: index 0). Returns `None`
/// for entries no writer could have produced.
fn decode_entry(entry: &[u8; ENTRY_LEN], registries: &Registries, now_ms: u32) -> Option<Channel> {
    let id = ChannelId::new(entry[ID])?;
    let mut channel = Channel::new(id);

    channel.short_name = bounded(get_name(&entry[SHORT_NAME..LONG_NAME])?);
    channel.long_name = bounded(get_name(&entry[LONG_NAME..APP_HASH])?);

    let app_hash = u16_at(entry, APP_HASH);
    let sensor_hash = u16_at(entry, SENSOR_HASH);
    let units_hash = u16_at(entry, UNITS_HASH);
    let application = registries.applications.index_by_hash(app_hash).unwrap_or_else(|| {
        warn!("channel {}: unknown application {=u16:#x}", id.raw(), app_hash);
        0
    });
    let sensor = registries.sensors.index_by_hash(sensor_hash).unwrap_or_else(|| {
        warn!("channel {}: unknown sensor {=u16:#x}", id.raw(), sensor_hash);
        0
    });
    channel.units = registries.units.index_by_hash(units_hash).unwrap_or_else(|| {
        warn!("channel {}: unknown units {=u16:#x}", id.raw(), units_hash);
        0
    });

    channel.application = application;
    channel.alarm_min = f32_at(entry, MIN);
    channel.alarm_max = f32_at(entry, MAX);
    channel.export_id = entry[EXPORT_ID];
    channel.export_len = entry[EXPORT_LEN];

    let flags = entry[FLAGS];
    channel.enabled = flags & FLAG_ENABLED != 0;
    channel.alarm_enabled = flags & FLAG_ALARM != 0;
    channel.display_enabled = flags & FLAG_DISPLAY != 0;
    channel.outputs = OutputMask::from_bits(flags >> OUTPUT_SHIFT).ok()?;

    // Non-init half of a sensor bind: behavior, measurement, calibration kind
    let sensor_entry = registries.sensors.lookup_by_index(sensor)?;
    channel.apply_sensor(sensor, sensor_entry);

    if flags & FLAG_CUSTOM_CAL != 0 {
        if entry[CAL_KIND] == channel.calibration_kind as u8 {
            let mut payload = [0u8; PAYLOAD_LEN];
            payload.copy_from_slice(&entry[CAL_PAYLOAD..]);
            channel.custom_calibration = Some(Calibration::from_bytes(channel.calibration_kind, &payload));
        } else {
            warn!("channel {}: calibration kind changed, override dropped", id.raw());
        }
    }

    let (warmup_ms, persist_ms) = registries
        .applications
        .lookup_by_index(application)
        .map_or((0, 0), |app| (app.warmup_ms as u32, app.persist_ms as u32));
    channel.alarm = AlarmContext::new(
        warmup_ms,
        persist_ms,
        channel.enabled && channel.alarm_enabled,
        now_ms,
    );
    Some(channel)
}

/// Channel table persistence on a byte-addressable device
pub struct ChannelStore<S> {
    storage: S,
    base: usize,
}

impl<S: NvStorage> ChannelStore<S> {
    /// Store the record at [`STORAGE_BASE`]
    pub fn new(storage: S) -> Self {
        Self::with_base(storage, STORAGE_BASE)
    }

    /// Store the record at `base`
    pub fn with_base(storage: S, base: usize) -> Self {
        Self { storage, base }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn entry_offset(&self, index: usize) -> usize {
        self.base + HEADER_LEN + index * ENTRY_LEN
    }

    /// Write every enabled channel, in slot order
    ///
    /// Entries go first and the header last. Returns the number of entries.
    pub fn save<const N: usize>(&mut self, manager: &ChannelManager<'_, N>) -> Result<u8, PersistError> {
        let registries = manager.registries();
        let mut count: u8 = 0;
        let mut checksum = 0u8;

        for channel in manager
            .iter()
            .filter(|c| c.is_enabled())
            .take(u8::MAX as usize)
        {
            let entry = encode_entry(channel, registries);
            self.storage
                .write_bytes(self.entry_offset(count as usize), &entry)?;
            checksum ^= xor(&entry);
            count += 1;
        }

        let mut header = [0u8; HEADER_LEN];
        header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        header[4..6].copy_from_slice(&SCHEMA_VERSION.to_le_bytes());
        header[6] = count;
        header[7] = checksum;
        self.storage.write_bytes(self.base, &header)?;

        info!("saved {} channels, checksum {=u8:#x}", count, checksum);
        Ok(count)
    }

    /// Replace the table with the stored record
    ///
    /// The table is cleared first and stays empty on any error. Entries past
    /// the table's capacity are checksummed but dropped. Returns the number
    /// of channels restored.
    pub fn load<const N: usize>(
        &mut self,
        manager: &mut ChannelManager<'_, N>,
        now_ms: u32,
    ) -> Result<usize, PersistError> {
        manager.clear_all();

        let mut header = [0u8; HEADER_LEN];
        self.storage.read_bytes(self.base, &mut header)?;
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let version = u16::from_le_bytes([header[4], header[5]]);
        if magic != MAGIC || version != SCHEMA_VERSION {
            info!("no stored configuration (magic {=u32:#x}, version {})", magic, version);
            return Err(PersistError::SchemaMismatch);
        }
        let count = header[6] as usize;
        if count > N {
            warn!("record holds {} channels, keeping {}", count, N);
        }

        if let Err(e) = self.restore_entries(manager, &header, now_ms) {
            manager.clear_all();
            return Err(e);
        }

        info!("loaded {} channels", manager.len());
        Ok(manager.len())
    }

    fn restore_entries<const N: usize>(
        &mut self,
        manager: &mut ChannelManager<'_, N>,
        header: &[u8; HEADER_LEN],
        now_ms: u32,
    ) -> Result<(), PersistError> {
        let registries = manager.registries();
        let mut checksum = 0u8;
        let mut undecodable = false;
        for i in 0..header[6] as usize {
            let mut entry = [0u8; ENTRY_LEN];
            self.storage.read_bytes(self.entry_offset(i), &mut entry)?;
            checksum ^= xor(&entry);
            if i >= N {
                continue;
            }
            match decode_entry(&entry, registries, now_ms) {
                Some(channel) => {
                    if manager.restore(channel).is_err() {
                        undecodable = true;
                    }
                }
                None => undecodable = true,
            }
        }

        if checksum != header[7] || undecodable {
            error!(
                "stored configuration corrupt (checksum {=u8:#x}, expected {=u8:#x})",
                checksum, header[7]
            );
            return Err(PersistError::Corrupted);
        }
        Ok(())
    }

    /// Clear the table and invalidate the stored header
    pub fn reset<const N: usize>(&mut self, manager: &mut ChannelManager<'_, N>) -> Result<(), PersistError> {
        manager.clear_all();
        self.storage.write_bytes(self.base, &[0xFF; HEADER_LEN])?;
        info!("configuration reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use telltale_hal::RamStorage;

    use crate::alarm::AlarmState;
    use crate::calibration::CalibrationKind;
    use crate::channel::OutputSink;
    use crate::config::record_len;
    use crate::registry::{APPLICATIONS, BUILTIN, SENSORS, UNITS};
    use crate::traits::SensorPort;

    struct NullPort;
    impl SensorPort for NullPort {}

    type Storage = RamStorage<{ record_len(8) }>;

    fn id(raw: u8) -> ChannelId {
        ChannelId::new(raw).unwrap()
    }

    fn configured(registries: &Registries) -> ChannelManager<'_, 8> {
        let mut mgr = ChannelManager::new(registries);
        let mut port = NullPort;
        let app = |name| registries.applications.index_by_name(name).unwrap();

        mgr.bind_application(id(6), app("CHT"), 0, &mut port).unwrap();
        mgr.set_short_name(id(6), "HEAD").unwrap();
        mgr.set_units(id(6), registries.units.index_by_name("FAHRENHEIT").unwrap())
            .unwrap();
        mgr.set_alarm_bounds(id(6), 5.0, 240.0).unwrap();

        mgr.bind_application(id(0xC3), app("OIL_PRESSURE"), 0, &mut port).unwrap();
        mgr.set_custom_calibration(
            id(0xC3),
            Calibration::Polynomial {
                bias: 1000.0,
                a: -3.0,
                b: 40.0,
                c: 10.0,
            },
        )
        .unwrap();
        mgr.set_output_route(id(0xC3), OutputSink::Dashboard, false).unwrap();
        mgr.set_export(id(0xC3), 0x0A, 1).unwrap();

        mgr.bind_application(id(0xF1), app("BAROMETRIC_PRESSURE"), 0, &mut port).unwrap();
        mgr.set_display_enabled(id(0xF1), false).unwrap();
        mgr
    }

    fn names(mgr: &ChannelManager<'_, 8>, ch: &Channel) -> (&'static str, &'static str, &'static str) {
        let reg = mgr.registries();
        (
            reg.applications.lookup_by_index(ch.application()).unwrap().name,
            reg.sensors.lookup_by_index(ch.sensor()).unwrap().name,
            reg.units.lookup_by_index(ch.units()).unwrap().name,
        )
    }

    fn assert_same(a: &ChannelManager<'_, 8>, b: &ChannelManager<'_, 8>) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id(), y.id());
            assert_eq!(x.short_name(), y.short_name());
            assert_eq!(x.long_name(), y.long_name());
            assert_eq!(names(a, x), names(b, y));
            assert_eq!(x.alarm_min().to_bits(), y.alarm_min().to_bits());
            assert_eq!(x.alarm_max().to_bits(), y.alarm_max().to_bits());
            assert_eq!((x.export_id(), x.export_len()), (y.export_id(), y.export_len()));
            assert_eq!(x.is_enabled(), y.is_enabled());
            assert_eq!(x.alarm_enabled(), y.alarm_enabled());
            assert_eq!(x.display_enabled(), y.display_enabled());
            assert_eq!(x.outputs(), y.outputs());
            assert_eq!(x.calibration_kind(), y.calibration_kind());
            assert_eq!(x.custom_calibration(), y.custom_calibration());
            assert_eq!(x.measurement(), y.measurement());
        }
    }

    #[test]
    fn test_round_trip() {
        let mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(Storage::new());
        assert_eq!(store.save(&mgr), Ok(3));

        let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(&BUILTIN);
        assert_eq!(store.load(&mut loaded, 5000), Ok(3));
        assert_same(&mgr, &loaded);

        let cht = loaded.get(id(6)).unwrap();
        assert!(cht.value().is_nan());
        assert_eq!(cht.alarm().state(), AlarmState::Init);
        assert_eq!(cht.alarm().entered_ms(), 5000);
        assert_eq!(cht.alarm().warmup_ms(), 30000);
        assert!(loaded.get(id(6)).and_then(|c| c.custom_calibration()).is_none());
    }

    #[test]
    fn test_save_skips_disabled() {
        let mut mgr = configured(&BUILTIN);
        mgr.set_enabled(id(0xC3), false, 0).unwrap();
        let mut store = ChannelStore::new(Storage::new());
        assert_eq!(store.save(&mgr), Ok(2));
    }

    fn leak<T: Clone>(table: &[T]) -> &'static [T] {
        let mut v = table.to_vec();
        // Keep the sentinel first, reverse the rest
        v[1..].reverse();
        Box::leak(v.into_boxed_slice())
    }

    #[test]
    fn test_round_trip_survives_reordering() {
        let mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(Storage::new());
        store.save(&mgr).unwrap();

        let reordered: &'static Registries = Box::leak(Box::new(Registries::new(
            leak(APPLICATIONS),
            leak(SENSORS),
            leak(UNITS),
        )));
        let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(reordered);
        assert_eq!(store.load(&mut loaded, 0), Ok(3));

        let cht = loaded.get(id(6)).unwrap();
        assert_ne!(cht.application(), mgr.get(id(6)).unwrap().application());
        assert_same(&mgr, &loaded);
    }

    #[test]
    fn test_missing_entries_degrade_to_none() {
        let mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(Storage::new());
        store.save(&mgr).unwrap();

        let trimmed: &'static Registries = Box::leak(Box::new(Registries::new(
            &APPLICATIONS[..1],
            &SENSORS[..1],
            &UNITS[..1],
        )));
        let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(trimmed);
        assert_eq!(store.load(&mut loaded, 0), Ok(3));
        let ch = loaded.get(id(0xC3)).unwrap();
        assert_eq!((ch.application(), ch.sensor(), ch.units()), (0, 0, 0));
        assert_eq!(ch.calibration_kind(), CalibrationKind::None);
        // Override no longer matches the bound sensor
        assert!(!ch.has_custom_calibration());
    }

    #[test]
    fn test_schema_mismatch() {
        let mut mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(Storage::new());
        assert_eq!(store.load(&mut mgr, 0), Err(PersistError::SchemaMismatch));
        assert!(mgr.is_empty());

        let mgr = configured(&BUILTIN);
        store.save(&mgr).unwrap();
        store.storage_mut().as_bytes_mut()[4] ^= 0x01;
        let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(&BUILTIN);
        assert_eq!(store.load(&mut loaded, 0), Err(PersistError::SchemaMismatch));
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_reset_invalidates_record() {
        let mut mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(Storage::new());
        store.save(&mgr).unwrap();
        store.reset(&mut mgr).unwrap();
        assert!(mgr.is_empty());
        assert_eq!(store.load(&mut mgr, 0), Err(PersistError::SchemaMismatch));
    }

    #[test]
    fn test_small_device() {
        let mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(RamStorage::<64>::new());
        assert_eq!(
            store.save(&mgr),
            Err(PersistError::Storage(StorageError::OutOfBounds))
        );
    }

    #[test]
    fn test_truncated_device_leaves_table_empty() {
        let mut mgr: ChannelManager<'_, 8> = ChannelManager::new(&BUILTIN);
        let cht = BUILTIN.applications.index_by_name("CHT").unwrap();
        mgr.bind_application(id(6), cht, 0, &mut NullPort).unwrap();
        let mut store = ChannelStore::new(RamStorage::<{ record_len(2) }>::new());
        assert_eq!(store.save(&mgr), Ok(1));

        // Header claims more entries than the device holds
        store.storage_mut().as_bytes_mut()[6] = 3;
        let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(&BUILTIN);
        assert_eq!(
            store.load(&mut loaded, 0),
            Err(PersistError::Storage(StorageError::OutOfBounds))
        );
        assert!(loaded.is_empty());
        assert_eq!(loaded.free_slots(), 8);
    }

    #[test]
    fn test_duplicate_id_conflict() {
        let mgr = configured(&BUILTIN);
        let mut store = ChannelStore::new(Storage::new());
        store.save(&mgr).unwrap();

        // Rewrite the second entry's id to match the first, fixing the checksum
        let bytes = store.storage_mut().as_bytes_mut();
        let at = HEADER_LEN + ENTRY_LEN;
        bytes[7] ^= bytes[at] ^ 6;
        bytes[at] = 6;

        let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(&BUILTIN);
        assert_eq!(store.load(&mut loaded, 0), Ok(3));
        let free = loaded.free_slots();
        let before = loaded.iter().next().map(|c| (c.application(), c.short_name().len()));

        let egt = BUILTIN.applications.index_by_name("EGT").unwrap();
        assert_eq!(
            loaded.bind_application(id(6), egt, 0, &mut NullPort),
            Err(crate::channel::ConfigError::Conflict)
        );
        assert_eq!(loaded.free_slots(), free);
        assert_eq!(
            loaded.iter().next().map(|c| (c.application(), c.short_name().len())),
            before
        );
    }

    proptest! {
        #[test]
        fn prop_any_entry_byte_flip_is_rejected(offset in 0..3 * ENTRY_LEN, flip in 1u8..=255) {
            let mgr = configured(&BUILTIN);
            let mut store = ChannelStore::new(Storage::new());
            store.save(&mgr).unwrap();
            store.storage_mut().as_bytes_mut()[HEADER_LEN + offset] ^= flip;

            let mut loaded: ChannelManager<'_, 8> = ChannelManager::new(&BUILTIN);
            prop_assert_eq!(store.load(&mut loaded, 0), Err(PersistError::Corrupted));
            prop_assert!(loaded.is_empty());
        }
    }
}
