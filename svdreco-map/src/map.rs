//! Bidirectional online/offline channel map.

use crate::parser::{parse_description, ChipEntry, MapDescription};
use crate::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use svdreco_core::{ChannelMapConfig, ChipAddress, SensorId, Side, APV_CHANNELS};

/// Where one chip's channels land on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSideInfo {
    /// Sensor read out by the chip.
    pub sensor: SensorId,
    /// Sensor side.
    pub side: Side,
    /// Strip connected to channel 0.
    pub channel0: u16,
    /// Strip connected to channel 127.
    pub channel127: u16,
}

impl SensorSideInfo {
    /// True if strip numbers grow with channel number.
    #[inline]
    #[must_use]
    pub fn is_ascending(&self) -> bool {
        self.channel127 >= self.channel0
    }

    /// Strip connected to `channel`: `channel0 ± channel`.
    ///
    /// The caller guarantees `channel < 128`.
    #[inline]
    #[must_use]
    pub fn strip_for_channel(&self, channel: u8) -> u16 {
        if self.is_ascending() {
            self.channel0 + u16::from(channel)
        } else {
            self.channel0 - u16::from(channel)
        }
    }
}

/// Inverse-direction record: which chip and channel read a strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipInfo {
    /// FADC board number.
    pub fadc: u8,
    /// APV25 chip number.
    pub apv: u8,
    /// Strip connected to channel 0.
    pub strip_first: u16,
    /// Strip connected to channel 127.
    pub strip_last: u16,
    /// Channel reading the queried strip (0 in stored entries).
    pub apv_channel: u8,
}

impl ChipInfo {
    /// Online address of the chip.
    #[must_use]
    pub fn address(&self) -> ChipAddress {
        ChipAddress::new(self.fadc, self.apv)
    }

    /// True if `strip` is read out by this chip.
    #[must_use]
    pub fn contains(&self, strip: u16) -> bool {
        let (low, high) = if self.strip_first <= self.strip_last {
            (self.strip_first, self.strip_last)
        } else {
            (self.strip_last, self.strip_first)
        };
        (low..=high).contains(&strip)
    }
}

/// An expected readout chip the map does not cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingApv {
    /// Sensor.
    pub sensor: SensorId,
    /// Sensor side.
    pub side: Side,
    /// First strip of the uncovered chip.
    pub first_strip: u16,
    /// Last strip of the uncovered chip.
    pub last_strip: u16,
}

impl MissingApv {
    /// True if the strip falls in this uncovered chip.
    #[must_use]
    pub fn contains(&self, sensor: SensorId, side: Side, strip: u16) -> bool {
        self.sensor == sensor
            && self.side == side
            && (self.first_strip..=self.last_strip).contains(&strip)
    }
}

/// Channel map between online (FADC, APV, channel) and offline
/// (sensor, side, strip) addressing.
///
/// Built once per run and read-only afterwards. Lookup misses are counted
/// and logged at a reduced rate.
#[derive(Debug)]
pub struct ChannelMap {
    name: Option<String>,
    forward: HashMap<ChipAddress, SensorSideInfo>,
    inverse: HashMap<(SensorId, Side), Vec<ChipInfo>>,
    valid: bool,
    config: ChannelMapConfig,
    misses: AtomicU64,
}

impl ChannelMap {
    /// Parses an XML description.
    ///
    /// # Errors
    /// Returns an error if the description is malformed.
    pub fn from_xml_str(xml: &str, config: ChannelMapConfig) -> Result<Self> {
        let description = parse_description(xml)?;
        Ok(Self::from_description(description, config))
    }

    /// Loads an XML description from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is malformed.
    pub fn from_file<P: AsRef<Path>>(path: P, config: ChannelMapConfig) -> Result<Self> {
        let xml = fs::read_to_string(path)?;
        Self::from_xml_str(&xml, config)
    }

    /// Loads a description, falling back to an empty, invalid map on failure.
    ///
    /// The failure is logged once. An invalid map resolves nothing, so no
    /// strips are produced downstream.
    pub fn load_or_empty<P: AsRef<Path>>(path: P, config: ChannelMapConfig) -> Self {
        let path = path.as_ref();
        match Self::from_file(path, config.clone()) {
            Ok(map) => map,
            Err(err) => {
                log::error!(
                    "cannot load channel map {}: {err}; no strips will be produced",
                    path.display()
                );
                Self::invalid(config)
            }
        }
    }

    /// An empty map marked invalid.
    #[must_use]
    pub fn invalid(config: ChannelMapConfig) -> Self {
        Self {
            name: None,
            forward: HashMap::new(),
            inverse: HashMap::new(),
            valid: false,
            config,
            misses: AtomicU64::new(0),
        }
    }

    /// Builds a map from parsed entries.
    ///
    /// A chip address seen twice keeps its first entry; the duplicate is
    /// logged and skipped.
    #[must_use]
    pub fn from_description(description: MapDescription, config: ChannelMapConfig) -> Self {
        let mut map = Self::invalid(config);
        map.name = description.name;
        map.valid = true;

        for entry in description.chips {
            map.insert(entry);
        }

        for ((sensor, side), chips) in &map.inverse {
            if chips.len() != 4 && chips.len() != 6 {
                log::warn!(
                    "sensor {sensor} side {side} has {} chips mapped (expected 4 or 6)",
                    chips.len()
                );
            }
        }
        map
    }

    fn insert(&mut self, entry: ChipEntry) {
        let ChipEntry {
            sensor,
            side,
            chip,
            strip_of_channel0,
            strip_of_channel127,
        } = entry;

        if let Some(existing) = self.forward.get(&chip) {
            log::warn!(
                "duplicate channel map entry for {chip}: keeping {} {}, ignoring {sensor} {side}",
                existing.sensor,
                existing.side
            );
            return;
        }

        self.forward.insert(
            chip,
            SensorSideInfo {
                sensor,
                side,
                channel0: strip_of_channel0,
                channel127: strip_of_channel127,
            },
        );
        self.inverse
            .entry((sensor, side))
            .or_default()
            .push(ChipInfo {
                fadc: chip.fadc,
                apv: chip.apv,
                strip_first: strip_of_channel0,
                strip_last: strip_of_channel127,
                apv_channel: 0,
            });
    }

    /// Map name from the description, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// False if the description could not be loaded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Number of mapped chips.
    #[must_use]
    pub fn chip_count(&self) -> usize {
        self.forward.len()
    }

    /// Resolves an online chip address.
    ///
    /// Unknown addresses return `None` and are counted; one miss out of
    /// `miss_log_suppression` is logged.
    pub fn resolve(&self, fadc: u8, apv: u8) -> Option<&SensorSideInfo> {
        let chip = ChipAddress::new(fadc, apv);
        let info = self.forward.get(&chip);
        if info.is_none() {
            let previous = self.misses.fetch_add(1, Ordering::Relaxed);
            if self.log_this_miss(previous) {
                log::warn!(
                    "no channel map entry for {chip} ({} lookup misses so far)",
                    previous + 1
                );
            }
        }
        info
    }

    // `previous` misses already counted; a suppression of 0 logs every miss.
    fn log_this_miss(&self, previous: u64) -> bool {
        previous % self.config.miss_log_suppression.max(1) == 0
    }

    /// Strip read by `channel` of a resolved chip.
    #[inline]
    #[must_use]
    pub fn strip_for_channel(channel: u8, info: &SensorSideInfo) -> u16 {
        info.strip_for_channel(channel)
    }

    /// Chips reading one sensor side, in description order.
    #[must_use]
    pub fn chips_for(&self, sensor: SensorId, side: Side) -> &[ChipInfo] {
        self.inverse
            .get(&(sensor, side))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Chip and channel reading a strip.
    #[must_use]
    pub fn chip_for(&self, sensor: SensorId, side: Side, strip: u16) -> Option<ChipInfo> {
        let chip = self
            .chips_for(sensor, side)
            .iter()
            .find(|chip| chip.contains(strip))?;
        let offset = chip.strip_first.abs_diff(strip);
        Some(ChipInfo {
            apv_channel: u8::try_from(offset).ok()?,
            ..*chip
        })
    }

    /// True if some chip reads this strip.
    #[must_use]
    pub fn is_channel_mapped(&self, sensor: SensorId, side: Side, strip: u16) -> bool {
        self.chips_for(sensor, side)
            .iter()
            .any(|chip| chip.contains(strip))
    }

    /// Sensor sides with at least one mapped chip, sorted.
    #[must_use]
    pub fn sensor_sides(&self) -> Vec<(SensorId, Side)> {
        let mut keys: Vec<_> = self.inverse.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Expected chips per side: six on U and on layer-3 V, four otherwise.
    #[must_use]
    pub fn expected_chips(sensor: SensorId, side: Side) -> u16 {
        if side.is_u() || sensor.layer == 3 {
            6
        } else {
            4
        }
    }

    /// Expected chips on the given sensors that the map does not cover.
    ///
    /// Chip `k` of a side is probed at its mid-point strip `128 k + 64`.
    pub fn missing_apvs<I>(&self, sensors: I) -> Vec<MissingApv>
    where
        I: IntoIterator<Item = SensorId>,
    {
        let channels = u16::from(APV_CHANNELS);
        let mut missing = Vec::new();
        for sensor in sensors {
            for side in Side::ALL {
                for k in 0..Self::expected_chips(sensor, side) {
                    let first_strip = k * channels;
                    let probe = first_strip + channels / 2;
                    if !self.is_channel_mapped(sensor, side, probe) {
                        missing.push(MissingApv {
                            sensor,
                            side,
                            first_strip,
                            last_strip: first_strip + channels - 1,
                        });
                    }
                }
            }
        }
        if !missing.is_empty() {
            log::warn!("{} expected APV chips are not in the channel map", missing.len());
            for apv in &missing {
                log::debug!(
                    "missing APV: {} {} strips {}..={}",
                    apv.sensor,
                    apv.side,
                    apv.first_strip,
                    apv.last_strip
                );
            }
        }
        missing
    }

    /// Number of failed [`ChannelMap::resolve`] calls so far.
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Logs the end-of-run miss summary, if there were misses.
    pub fn log_summary(&self) {
        let misses = self.miss_count();
        if misses > 0 {
            log::warn!(
                "channel map {}: {misses} raw records had no map entry and were dropped",
                self.name().unwrap_or("<unnamed>")
            );
        }
    }
}
