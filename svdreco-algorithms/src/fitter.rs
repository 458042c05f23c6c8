//! Time-PDF fitting of APV25 pulses.
//!
//! Every strip carries a probability distribution for the pulse start time
//! over a fixed set of time bins. The fitter combines those distributions
//! into a joint cluster hypothesis, extracts the cluster time from it, and
//! fits each strip's amplitude at that time.
#![allow(clippy::cast_precision_loss)]

use svdreco_core::{ApvSamples, ClusteringError, TimeEstimator, TimeFitterConfig, APV_SAMPLES};

/// Normalised APV25 pulse shape (beta-prime form).
///
/// `w(t) = 149.012 z² (1 + z)^-10` with `z = t / tau`, zero for `t <= 0`.
/// The maximum, close to 1, is reached at `t = tau / 4`.
#[inline]
#[must_use]
pub fn beta_prime_waveform(t: f64, tau: f64) -> f64 {
    if t <= 0.0 || tau <= 0.0 {
        return 0.0;
    }
    let z = t / tau;
    149.012 * z * z * (1.0 + z).powi(-10)
}

/// Result of a one-parameter amplitude fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeFit {
    /// Best-fit amplitude in units of the sample noise.
    pub amplitude: f64,
    /// Standard error of the amplitude.
    pub amplitude_error: f64,
    /// Residual chi-square per degree of freedom.
    pub chi2: f64,
}

struct LinearFit {
    amplitude: f64,
    norm: f64,
    residual: f64,
}

/// Time-PDF fitter over a fixed binning.
#[derive(Debug, Clone)]
pub struct TimePdfFitter {
    edges: Vec<f64>,
    centers: Vec<f64>,
    sample_interval: f64,
    estimator: TimeEstimator,
}

impl Default for TimePdfFitter {
    fn default() -> Self {
        Self::new(&TimeFitterConfig::default(), TimeEstimator::default())
    }
}

impl TimePdfFitter {
    /// Creates a fitter from a binning.
    #[must_use]
    pub fn new(config: &TimeFitterConfig, estimator: TimeEstimator) -> Self {
        let centers = config
            .bin_edges
            .windows(2)
            .map(|w| 0.5 * (w[0] + w[1]))
            .collect();
        Self {
            edges: config.bin_edges.clone(),
            centers,
            sample_interval: config.sample_interval_ns,
            estimator,
        }
    }

    /// Number of time bins.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.centers.len()
    }

    /// Bin centres (ns).
    #[must_use]
    pub fn bin_centers(&self) -> &[f64] {
        &self.centers
    }

    /// Flat distribution, the neutral element of [`TimePdfFitter::multiply`].
    #[must_use]
    pub fn uniform_pdf(&self) -> Vec<f64> {
        let n = self.bin_count().max(1);
        vec![1.0 / n as f64; self.bin_count()]
    }

    /// Checks that a probability array matches the binning.
    ///
    /// # Errors
    /// Returns [`ClusteringError::BinCountMismatch`] on a length mismatch.
    pub fn check_bins(&self, pdf: &[f64]) -> Result<(), ClusteringError> {
        if pdf.len() == self.bin_count() {
            Ok(())
        } else {
            Err(ClusteringError::BinCountMismatch {
                expected: self.bin_count(),
                found: pdf.len(),
            })
        }
    }

    /// Multiplies `accumulator` by `pdf` bin by bin and renormalises.
    ///
    /// An all-zero product is left as is.
    ///
    /// # Errors
    /// Returns [`ClusteringError::BinCountMismatch`] if `pdf` does not match
    /// the binning; the accumulator is untouched in that case.
    pub fn multiply(&self, accumulator: &mut [f64], pdf: &[f64]) -> Result<(), ClusteringError> {
        self.check_bins(pdf)?;
        self.check_bins(accumulator)?;
        for (acc, p) in accumulator.iter_mut().zip(pdf) {
            *acc *= p;
        }
        let total: f64 = accumulator.iter().sum();
        if total > 0.0 && total.is_finite() {
            accumulator.iter_mut().for_each(|acc| *acc /= total);
        }
        Ok(())
    }

    /// Extracts the pulse start time and its uncertainty from a distribution.
    ///
    /// A distribution with no weight yields the mean bin centre with an
    /// error of half the binned range.
    #[must_use]
    pub fn time_shift(&self, pdf: &[f64]) -> (f64, f64) {
        let total: f64 = pdf.iter().sum();
        if !(total > 0.0 && total.is_finite()) || self.centers.is_empty() {
            return self.no_information();
        }
        let time = match self.estimator {
            TimeEstimator::Centroid => self.centroid(pdf, total),
            TimeEstimator::Parabolic => self.parabolic_peak(pdf),
        };
        (time, self.spread(pdf, total, time))
    }

    fn no_information(&self) -> (f64, f64) {
        match (self.edges.first(), self.edges.last()) {
            (Some(&low), Some(&high)) if self.edges.len() > 1 => {
                (0.5 * (low + high), 0.5 * (high - low))
            }
            _ => (0.0, 0.0),
        }
    }

    fn centroid(&self, pdf: &[f64], total: f64) -> f64 {
        pdf.iter()
            .zip(&self.centers)
            .map(|(p, c)| p * c)
            .sum::<f64>()
            / total
    }

    fn parabolic_peak(&self, pdf: &[f64]) -> f64 {
        let peak = pdf
            .iter()
            .enumerate()
            .fold(0, |best, (i, &p)| if p > pdf[best] { i } else { best });
        if peak == 0 || peak + 1 >= pdf.len() {
            return self.centers[peak];
        }
        let (y0, y1, y2) = (pdf[peak - 1], pdf[peak], pdf[peak + 1]);
        let curvature = y0 - 2.0 * y1 + y2;
        if curvature >= 0.0 {
            return self.centers[peak];
        }
        let offset = (0.5 * (y0 - y2) / curvature).clamp(-0.5, 0.5);
        let step = 0.5 * (self.centers[peak + 1] - self.centers[peak - 1]);
        self.centers[peak] + offset * step
    }

    // RMS about `time`, with the bin-width quantisation term.
    fn spread(&self, pdf: &[f64], total: f64, time: f64) -> f64 {
        let (variance, quantisation) = pdf
            .iter()
            .zip(&self.centers)
            .zip(self.edges.windows(2))
            .fold((0.0, 0.0), |(var, quant), ((p, c), w)| {
                let width = w[1] - w[0];
                (var + p * (c - time).powi(2), quant + p * width * width / 12.0)
            });
        ((variance + quantisation) / total).sqrt()
    }

    fn linear_fit(&self, samples: &ApvSamples, start_time: f64, tau: f64) -> LinearFit {
        let mut waveform = [0.0; APV_SAMPLES];
        for (i, w) in waveform.iter_mut().enumerate() {
            *w = beta_prime_waveform(i as f64 * self.sample_interval - start_time, tau);
        }
        let norm: f64 = waveform.iter().map(|w| w * w).sum();
        let amplitude = if norm > 0.0 {
            samples.iter().zip(&waveform).map(|(s, w)| s * w).sum::<f64>() / norm
        } else {
            0.0
        };
        let residual = samples
            .iter()
            .zip(&waveform)
            .map(|(s, w)| (s - amplitude * w).powi(2))
            .sum();
        LinearFit {
            amplitude,
            norm,
            residual,
        }
    }

    /// Fits the amplitude of noise-normalised samples at a fixed start time.
    ///
    /// The degenerate case of a pulse shape with zero norm over the sampled
    /// window returns amplitude 0, infinite error and chi-square 0.
    #[must_use]
    pub fn amplitude_chi2(&self, samples: &ApvSamples, start_time: f64, tau: f64) -> AmplitudeFit {
        let fit = self.linear_fit(samples, start_time, tau);
        if fit.norm <= 0.0 {
            return AmplitudeFit {
                amplitude: 0.0,
                amplitude_error: f64::INFINITY,
                chi2: 0.0,
            };
        }
        AmplitudeFit {
            amplitude: fit.amplitude,
            amplitude_error: fit.norm.sqrt().recip(),
            chi2: fit.residual / (APV_SAMPLES - 1) as f64,
        }
    }

    /// Start-time distribution of one strip from its noise-normalised samples.
    ///
    /// Each bin gets the likelihood `exp(-chi2 / 2)` of the best amplitude
    /// fit with the pulse starting at the bin centre; the result sums to 1.
    #[must_use]
    pub fn strip_pdf(&self, samples: &ApvSamples, tau: f64) -> Vec<f64> {
        let chi2: Vec<f64> = self
            .centers
            .iter()
            .map(|&t| self.linear_fit(samples, t, tau).residual)
            .collect();
        let best = chi2.iter().copied().fold(f64::INFINITY, f64::min);
        let mut pdf: Vec<f64> = chi2.iter().map(|c| (-0.5 * (c - best)).exp()).collect();
        let total: f64 = pdf.iter().sum();
        if total > 0.0 && total.is_finite() {
            pdf.iter_mut().for_each(|p| *p /= total);
        }
        pdf
    }
}
