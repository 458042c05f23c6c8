//! Raw APV samples to offline strip digits.

use crate::builder::{normalise_samples, PulseShape};
use crate::fitter::TimePdfFitter;
use svdreco_core::{
    ApvSamples, ClusterizerConfig, RawApvSamples, StripCalibration, StripDigit, UnpackerConfig,
    APV_CHANNELS,
};
use svdreco_map::ChannelMap;

/// Per-event counters of the unpacker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackStatistics {
    /// Raw records read.
    pub records: usize,
    /// Records on chips missing from the map.
    pub unmapped: usize,
    /// Records with a channel number outside the chip.
    pub bad_channel: usize,
    /// Records dropped by zero suppression.
    pub suppressed: usize,
    /// Records dropped as repeats of an earlier strip.
    pub duplicates: usize,
}

/// Turns online-addressed samples into sorted strip digits.
pub struct Unpacker<'a> {
    config: &'a UnpackerConfig,
    map: &'a ChannelMap,
    calibration: &'a dyn StripCalibration,
    fitter: &'a TimePdfFitter,
    shape: &'a ClusterizerConfig,
}

impl<'a> Unpacker<'a> {
    /// Creates an unpacker. `shape` selects calibrated or default pulse
    /// shapes for the per-strip time PDFs.
    #[must_use]
    pub fn new(
        config: &'a UnpackerConfig,
        map: &'a ChannelMap,
        calibration: &'a dyn StripCalibration,
        fitter: &'a TimePdfFitter,
        shape: &'a ClusterizerConfig,
    ) -> Self {
        Self {
            config,
            map,
            calibration,
            fitter,
            shape,
        }
    }

    /// Unpacks one event.
    ///
    /// Digits come out sorted by sensor, side and strip, each pointing back
    /// at its raw record. A strip seen twice keeps its first record.
    #[must_use]
    pub fn unpack(&self, raw: &[RawApvSamples]) -> (Vec<StripDigit>, UnpackStatistics) {
        let mut stats = UnpackStatistics {
            records: raw.len(),
            ..Default::default()
        };
        let mut digits = Vec::with_capacity(raw.len());

        for (index, record) in raw.iter().enumerate() {
            let Some(info) = self.map.resolve(record.fadc, record.apv) else {
                stats.unmapped += 1;
                continue;
            };
            if record.channel >= APV_CHANNELS {
                log::debug!(
                    "FADC {} APV {}: channel {} out of range",
                    record.fadc,
                    record.apv,
                    record.channel
                );
                stats.bad_channel += 1;
                continue;
            }
            let strip = ChannelMap::strip_for_channel(record.channel, info);
            let noise = self.calibration.noise(info.sensor, info.side, strip);
            if !self.passes_zero_suppression(&record.samples, noise) {
                stats.suppressed += 1;
                continue;
            }

            let shape =
                PulseShape::for_strip(self.shape, self.calibration, info.sensor, info.side, strip);
            let normed = normalise_samples(&record.samples, noise);
            digits.push(StripDigit::new(
                info.sensor,
                info.side,
                strip,
                Some(index),
                self.fitter.strip_pdf(&normed, shape.tau),
            ));
        }

        digits.sort_by_key(StripDigit::sort_key);
        let before = digits.len();
        digits.dedup_by_key(|d| d.sort_key());
        stats.duplicates = before - digits.len();
        if stats.duplicates > 0 {
            log::warn!("{} raw records repeat an already unpacked strip", stats.duplicates);
        }
        (digits, stats)
    }

    /// True if enough consecutive samples reach `cut × noise`.
    #[must_use]
    pub fn passes_zero_suppression(&self, samples: &ApvSamples, noise: f64) -> bool {
        let needed = self.config.min_consecutive_samples;
        if needed == 0 {
            return true;
        }
        let threshold = self.config.zero_suppression_cut * noise;
        let mut run = 0;
        for &sample in samples {
            if sample >= threshold {
                run += 1;
                if run >= needed {
                    return true;
                }
            } else {
                run = 0;
            }
        }
        false
    }
}
