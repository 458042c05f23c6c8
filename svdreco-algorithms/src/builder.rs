//! Cluster building from one strip group.
//!
//! Steps per group:
//! - per-strip noise and pulse shape from calibration
//! - joint time from the product of the strip time PDFs
//! - per-strip amplitude fit at that time
//! - charge / seed quality gate
//! - centre-of-gravity or head-tail position, Lorentz corrected

use crate::fitter::TimePdfFitter;
use svdreco_core::{
    ApvSamples, Cluster, ClusterizerConfig, ClusteringError, RawApvSamples, SensorGeometry,
    SensorId, Side, StripCalibration, StripContribution, StripDigit, APV_SAMPLES,
};

/// Ratio of the beta-prime decay constant to the calibrated pulse width.
pub const WIDTH_TO_TAU: f64 = 1.988;

/// Pulse shape parameters of one strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseShape {
    /// Beta-prime decay constant (ns).
    pub tau: f64,
    /// Offset between the pulse start and the reported hit time (ns).
    pub time_shift: f64,
}

impl PulseShape {
    /// Pulse shape of a strip, from calibration or the configured defaults.
    #[must_use]
    pub fn for_strip(
        config: &ClusterizerConfig,
        calibration: &dyn StripCalibration,
        sensor: SensorId,
        side: Side,
        strip: u16,
    ) -> Self {
        if config.use_calibrated_peak_shape {
            let tau = WIDTH_TO_TAU * calibration.width(sensor, side, strip);
            Self {
                tau,
                time_shift: calibration.peak_time(sensor, side, strip) - 0.25 * tau,
            }
        } else {
            Self {
                tau: config.default_peak_width,
                time_shift: match side {
                    Side::U => config.default_time_shift_u,
                    Side::V => config.default_time_shift_v,
                },
            }
        }
    }
}

/// Divides samples by the strip noise. Non-positive noise leaves them as is.
#[must_use]
pub fn normalise_samples(samples: &ApvSamples, noise_adu: f64) -> ApvSamples {
    let scale = if noise_adu > 0.0 { noise_adu } else { 1.0 };
    let mut normed = [0.0; APV_SAMPLES];
    for (n, s) in normed.iter_mut().zip(samples) {
        *n = s / scale;
    }
    normed
}

struct StripInput<'d> {
    index: usize,
    digit: &'d StripDigit,
    samples: ApvSamples,
    noise: f64,
    shape: PulseShape,
}

struct Position {
    value: f64,
    error: f64,
}

/// Builds clusters from strip groups.
pub struct ClusterBuilder<'a> {
    config: &'a ClusterizerConfig,
    fitter: &'a TimePdfFitter,
    calibration: &'a dyn StripCalibration,
    geometry: &'a dyn SensorGeometry,
}

impl<'a> ClusterBuilder<'a> {
    /// Creates a builder over read-only configuration, fitter, calibration
    /// and geometry.
    #[must_use]
    pub fn new(
        config: &'a ClusterizerConfig,
        fitter: &'a TimePdfFitter,
        calibration: &'a dyn StripCalibration,
        geometry: &'a dyn SensorGeometry,
    ) -> Self {
        Self {
            config,
            fitter,
            calibration,
            geometry,
        }
    }

    /// Builds the cluster of one strip group.
    ///
    /// `group` holds indices into `digits`, in strip order, all on one
    /// sensor side. Returns `Ok(None)` for an empty group or one that fails
    /// the charge or seed cut.
    ///
    /// # Errors
    /// [`ClusteringError::DigitOutOfRange`] if `group` holds an index past
    /// the end of `digits`,
    /// [`ClusteringError::MissingRawSamples`] if a digit has no raw record,
    /// [`ClusteringError::BinCountMismatch`] if a digit's time PDF does not
    /// match the fitter binning.
    #[allow(clippy::cast_precision_loss)]
    pub fn build(
        &self,
        group: &[usize],
        digits: &[StripDigit],
        raw: &[RawApvSamples],
    ) -> Result<Option<Cluster>, ClusteringError> {
        let strips = group
            .iter()
            .map(|&index| self.strip_input(index, digits, raw))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(first) = strips.first() else {
            return Ok(None);
        };
        let (sensor, side) = first.digit.key();
        let size = strips.len() as f64;

        let noise = (strips.iter().map(|s| s.noise * s.noise).sum::<f64>() / size).sqrt();

        let mut joint = self.fitter.uniform_pdf();
        for strip in &strips {
            if strip.digit.probabilities.is_empty() {
                let pdf = self.fitter.strip_pdf(&strip.samples, strip.shape.tau);
                self.fitter.multiply(&mut joint, &pdf)?;
            } else {
                self.fitter.multiply(&mut joint, &strip.digit.probabilities)?;
            }
        }
        let (start_time, time_error) = self.fitter.time_shift(&joint);

        let mut contributions = Vec::with_capacity(strips.len());
        let mut charge = 0.0;
        let mut variance = 0.0;
        let mut chi2 = 0.0;
        let mut seed_charge = f64::NEG_INFINITY;
        for strip in &strips {
            let fit = self
                .fitter
                .amplitude_chi2(&strip.samples, start_time, strip.shape.tau);
            let amplitude = fit.amplitude * strip.noise;
            let error = fit.amplitude_error * strip.noise;
            charge += amplitude;
            variance += error * error;
            chi2 += fit.chi2;
            seed_charge = seed_charge.max(amplitude);
            contributions.push(StripContribution {
                digit: strip.index,
                strip: strip.digit.strip,
                amplitude,
            });
        }
        let charge_error = variance.sqrt();
        let signal_to_noise = if charge_error > 0.0 {
            charge / charge_error
        } else {
            charge
        };

        if charge < noise * self.config.cluster_cut || seed_charge < noise * self.config.seed_cut {
            log::trace!(
                "{sensor} {side}: group at strip {} rejected (charge {charge:.1}, seed {seed_charge:.1}, noise {noise:.1})",
                first.digit.strip
            );
            return Ok(None);
        }

        let mean_shift = strips.iter().map(|s| s.shape.time_shift).sum::<f64>() / size;
        let position = self.position(sensor, side, &contributions, charge, noise);
        let lorentz = self.geometry.lorentz_shift(sensor, side, position.value);

        Ok(Some(Cluster {
            sensor,
            side,
            position: position.value - lorentz,
            position_error: position.error,
            time: start_time - mean_shift,
            time_error,
            charge,
            charge_error,
            seed_charge,
            size: u16::try_from(contributions.len()).unwrap_or(u16::MAX),
            signal_to_noise,
            chi2: chi2 / size,
            strips: contributions,
        }))
    }

    fn strip_input<'d>(
        &self,
        index: usize,
        digits: &'d [StripDigit],
        raw: &[RawApvSamples],
    ) -> Result<StripInput<'d>, ClusteringError> {
        let digit = digits
            .get(index)
            .ok_or(ClusteringError::DigitOutOfRange {
                digit: index,
                len: digits.len(),
            })?;
        let Some(record) = digit.raw_index.and_then(|i| raw.get(i)) else {
            return Err(ClusteringError::MissingRawSamples {
                digit: index,
                sensor: digit.sensor,
                side: digit.side,
                strip: digit.strip,
            });
        };
        let noise_adu = self.calibration.noise(digit.sensor, digit.side, digit.strip);
        Ok(StripInput {
            index,
            digit,
            samples: normalise_samples(&record.samples, noise_adu),
            noise: self
                .calibration
                .charge_from_adc(digit.sensor, digit.side, digit.strip, noise_adu),
            shape: PulseShape::for_strip(
                self.config,
                self.calibration,
                digit.sensor,
                digit.side,
                digit.strip,
            ),
        })
    }

    fn position(
        &self,
        sensor: SensorId,
        side: Side,
        strips: &[StripContribution],
        charge: f64,
        noise: f64,
    ) -> Position {
        if strips.len() >= self.config.head_tail_size {
            if let Some(position) = self.head_tail(sensor, side, strips, charge, noise) {
                return position;
            }
        }
        self.centre_of_gravity(sensor, side, strips, charge, noise)
    }

    #[allow(clippy::cast_precision_loss)]
    fn centre_of_gravity(
        &self,
        sensor: SensorId,
        side: Side,
        strips: &[StripContribution],
        charge: f64,
        noise: f64,
    ) -> Position {
        let pitch = self.geometry.pitch(sensor, side);
        let positions = strips
            .iter()
            .map(|s| (self.geometry.strip_position(sensor, side, s.strip), s.amplitude));

        let value = if charge == 0.0 {
            positions.map(|(x, _)| x).sum::<f64>() / strips.len() as f64
        } else {
            positions.map(|(x, a)| x * a).sum::<f64>() / charge
        };

        let phantom = self.config.neighbour_cut * noise;
        let denominator = if strips.len() == 1 {
            charge + phantom
        } else {
            charge
        };
        let error = if denominator > 0.0 {
            pitch * phantom / denominator
        } else {
            pitch
        };
        Position { value, error }
    }

    #[allow(clippy::cast_precision_loss)]
    fn head_tail(
        &self,
        sensor: SensorId,
        side: Side,
        strips: &[StripContribution],
        charge: f64,
        noise: f64,
    ) -> Option<Position> {
        let inner = strips.len().checked_sub(2).filter(|&n| n > 0)?;
        let (first, last) = (strips.first()?, strips.last()?);
        let centre = (charge - first.amplitude - last.amplitude) / inner as f64;
        if centre <= 0.0 {
            return None;
        }
        let left = first.amplitude.min(centre);
        let right = last.amplitude.min(centre);

        let pitch = self.geometry.pitch(sensor, side);
        let head = self.geometry.strip_position(sensor, side, first.strip);
        let tail = self.geometry.strip_position(sensor, side, last.strip);
        let value = 0.5 * (head + tail) + 0.5 * (right - left) / centre * pitch;

        let sn = centre / self.config.neighbour_cut / noise;
        let landau_head = left / centre;
        let landau_tail = right / centre;
        let error = 0.5
            * pitch
            * (1.0 / (sn * sn)
                + 0.5 * landau_head * landau_head
                + 0.5 * landau_tail * landau_tail)
                .sqrt();
        Some(Position {
            value,
            error: if error.is_finite() { error } else { pitch },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitter::beta_prime_waveform;
    use approx::assert_relative_eq;
    use svdreco_core::{ConstantCalibration, StripGeometry, TimeFitterConfig};

    const SENSOR: SensorId = SensorId::new(3, 1, 1);

    fn unit_calibration() -> ConstantCalibration {
        ConstantCalibration {
            noise_adu: 1.0,
            electrons_per_adu: 1.0,
            ..Default::default()
        }
    }

    fn pulse(amplitude: f64, start: f64, tau: f64) -> ApvSamples {
        let mut samples = [0.0; APV_SAMPLES];
        for (i, s) in samples.iter_mut().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 * TimeFitterConfig::APV_SAMPLE_INTERVAL_NS - start;
            *s = amplitude * beta_prime_waveform(t, tau);
        }
        samples
    }

    // Digits on consecutive strips with one-hot PDFs on `bin`.
    fn event(
        fitter: &TimePdfFitter,
        config: &ClusterizerConfig,
        calibration: &ConstantCalibration,
        first_strip: u16,
        amplitudes: &[f64],
        bin: usize,
    ) -> (Vec<StripDigit>, Vec<RawApvSamples>) {
        let start = fitter.bin_centers()[bin];
        let mut digits = Vec::new();
        let mut raw = Vec::new();
        for (i, &a) in amplitudes.iter().enumerate() {
            let strip = first_strip + u16::try_from(i).unwrap();
            let shape = PulseShape::for_strip(config, calibration, SENSOR, Side::U, strip);
            let mut pdf = vec![0.0; fitter.bin_count()];
            pdf[bin] = 1.0;
            raw.push(RawApvSamples::new(1, 0, 0, pulse(a, start, shape.tau)));
            digits.push(StripDigit::new(SENSOR, Side::U, strip, Some(i), pdf));
        }
        (digits, raw)
    }

    #[test]
    fn test_pulse_shape_modes() {
        let calibration = unit_calibration();
        let calibrated = ClusterizerConfig::default();
        let shape = PulseShape::for_strip(&calibrated, &calibration, SENSOR, Side::U, 0);
        assert_relative_eq!(shape.tau, 1.988 * 135.8, epsilon = 1e-9);
        assert_relative_eq!(shape.time_shift, 72.0 - 0.25 * shape.tau, epsilon = 1e-9);

        let fixed = ClusterizerConfig::default().with_calibrated_peak_shape(false);
        let u = PulseShape::for_strip(&fixed, &calibration, SENSOR, Side::U, 0);
        let v = PulseShape::for_strip(&fixed, &calibration, SENSOR, Side::V, 0);
        assert_relative_eq!(u.tau, 270.0);
        assert_relative_eq!(u.time_shift, 4.0);
        assert_relative_eq!(v.time_shift, 0.0);
    }

    #[test]
    fn test_charge_and_seed() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default().with_cluster_cut(6.0);
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (digits, raw) = event(&fitter, &config, &calibration, 10, &[5.0, 20.0, 5.0], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0, 1, 2], &digits, &raw).unwrap().unwrap();

        assert_eq!(cluster.size, 3);
        assert_relative_eq!(cluster.charge, 30.0, epsilon = 1e-9);
        assert_relative_eq!(cluster.seed_charge, 20.0, epsilon = 1e-9);
        let sum: f64 = cluster.strips.iter().map(|s| s.amplitude).sum();
        assert_eq!(cluster.charge, sum);
        assert!(cluster.signal_to_noise > 0.0);
        assert_relative_eq!(cluster.chi2, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cluster_time_subtracts_mean_shift() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default().with_calibrated_peak_shape(false);
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (digits, raw) = event(&fitter, &config, &calibration, 100, &[30.0], 70);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0], &digits, &raw).unwrap().unwrap();
        assert_relative_eq!(cluster.time, fitter.bin_centers()[70] - 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_strip_cog_error_includes_phantom() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default();
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (digits, raw) = event(&fitter, &config, &calibration, 100, &[20.0], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0], &digits, &raw).unwrap().unwrap();

        let pitch = geometry.pitch(SENSOR, Side::U);
        assert_relative_eq!(
            cluster.position,
            geometry.strip_position(SENSOR, Side::U, 100),
            epsilon = 1e-12
        );
        assert_relative_eq!(cluster.position_error, pitch * 5.0 / 25.0, epsilon = 1e-9);
    }

    #[test]
    fn test_head_tail_caps_edges() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default().with_head_tail_size(3);
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        // The right edge exceeds the centre and is capped to it.
        let (digits, raw) = event(&fitter, &config, &calibration, 40, &[5.0, 20.0, 40.0], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0, 1, 2], &digits, &raw).unwrap().unwrap();

        let pitch = geometry.pitch(SENSOR, Side::U);
        let mid = geometry.strip_position(SENSOR, Side::U, 41);
        assert_relative_eq!(cluster.position, mid + 0.5 * 15.0 / 20.0 * pitch, epsilon = 1e-9);
    }

    #[test]
    fn test_head_tail_error_keeps_landau_terms_at_high_sn() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default();
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (digits, raw) = event(&fitter, &config, &calibration, 60, &[200.0; 4], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0, 1, 2, 3], &digits, &raw).unwrap().unwrap();

        // centre 200, S/N 200 / 5 = 40, both edges at the centre charge
        let pitch = geometry.pitch(SENSOR, Side::U);
        let expected = 0.5 * pitch * (1.0 / 1600.0 + 0.5 + 0.5_f64).sqrt();
        assert_relative_eq!(cluster.position_error, expected, epsilon = 1e-9);
        assert!(cluster.position_error > 0.5 * pitch);
    }

    #[test]
    fn test_two_strip_threshold_falls_back_to_centre_of_gravity() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default().with_head_tail_size(2);
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (digits, raw) = event(&fitter, &config, &calibration, 60, &[20.0, 20.0], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0, 1], &digits, &raw).unwrap().unwrap();

        let pitch = geometry.pitch(SENSOR, Side::U);
        assert!(cluster.position.is_finite());
        assert_relative_eq!(cluster.position_error, pitch * 5.0 / 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_group_index_past_digits_is_an_error() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default();
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (digits, raw) = event(&fitter, &config, &calibration, 10, &[20.0, 20.0], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let err = builder.build(&[0, 1, 2], &digits, &raw).unwrap_err();
        assert_eq!(err, ClusteringError::DigitOutOfRange { digit: 2, len: 2 });
    }

    #[test]
    fn test_lorentz_shift_is_subtracted() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default();
        let calibration = unit_calibration();
        let geometry = StripGeometry {
            tan_lorentz_u: 0.1,
            ..Default::default()
        };
        let (digits, raw) = event(&fitter, &config, &calibration, 7, &[20.0], 50);

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0], &digits, &raw).unwrap().unwrap();
        let expected = geometry.strip_position(SENSOR, Side::U, 7) - 0.5 * 0.032 * 0.1;
        assert_relative_eq!(cluster.position, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_raw_record_is_fatal() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default();
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (mut digits, raw) = event(&fitter, &config, &calibration, 10, &[10.0, 10.0], 50);
        digits[1].raw_index = None;

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let err = builder.build(&[0, 1], &digits, &raw).unwrap_err();
        assert_eq!(
            err,
            ClusteringError::MissingRawSamples {
                digit: 1,
                sensor: SENSOR,
                side: Side::U,
                strip: 11
            }
        );
    }

    #[test]
    fn test_empty_pdf_is_computed_from_samples() {
        let fitter = TimePdfFitter::default();
        let config = ClusterizerConfig::default();
        let calibration = unit_calibration();
        let geometry = StripGeometry::default();
        let (mut digits, raw) = event(&fitter, &config, &calibration, 10, &[40.0], 50);
        digits[0].probabilities.clear();

        let builder = ClusterBuilder::new(&config, &fitter, &calibration, &geometry);
        let cluster = builder.build(&[0], &digits, &raw).unwrap().unwrap();
        assert!(cluster.charge > 0.0);
        assert_eq!(cluster.size, 1);
    }
}
