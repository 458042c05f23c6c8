//! Per-event clustering pipeline.
//!
//! Digits are ordered by sensor, side and strip, split into one stream per
//! sensor side, grouped into strip runs and turned into clusters. Relations
//! from clusters to digits, MC particles and true hits are attached last.

use crate::builder::ClusterBuilder;
use crate::fitter::TimePdfFitter;
use crate::grouping::group_strips;
use crate::unpack::Unpacker;
use rayon::prelude::*;
use std::collections::BTreeMap;
use svdreco_core::relation::target::{Digit, McParticle, TrueHit};
use svdreco_core::{
    Cluster, ClusterizerConfig, ClusteringError, RawApvSamples, RelationTable, RelationTarget,
    Result, SensorGeometry, StripCalibration, StripDigit, TimeFitterConfig, UnpackerConfig,
};
use svdreco_map::ChannelMap;

/// Inputs of one event.
#[derive(Debug, Clone, Copy)]
pub struct EventInput<'a> {
    /// Strip digits, in any order.
    pub digits: &'a [StripDigit],
    /// Raw sample records the digits point into.
    pub raw: &'a [RawApvSamples],
    /// Digit to MC particle relations, if the event has them.
    pub mc_relations: Option<&'a RelationTable<McParticle>>,
    /// Digit to true hit relations, if the event has them.
    pub truehit_relations: Option<&'a RelationTable<TrueHit>>,
}

impl<'a> EventInput<'a> {
    /// Input without truth relations.
    #[must_use]
    pub fn new(digits: &'a [StripDigit], raw: &'a [RawApvSamples]) -> Self {
        Self {
            digits,
            raw,
            mc_relations: None,
            truehit_relations: None,
        }
    }

    /// Attaches digit to MC particle relations.
    #[must_use]
    pub fn with_mc_relations(mut self, relations: &'a RelationTable<McParticle>) -> Self {
        self.mc_relations = Some(relations);
        self
    }

    /// Attaches digit to true hit relations.
    #[must_use]
    pub fn with_truehit_relations(mut self, relations: &'a RelationTable<TrueHit>) -> Self {
        self.truehit_relations = Some(relations);
        self
    }
}

/// Clusters and relations of one event.
#[derive(Debug, Clone, Default)]
pub struct EventOutput {
    /// Clusters ordered by sensor, side and first strip.
    pub clusters: Vec<Cluster>,
    /// Cluster to digit relations weighted by strip amplitude.
    pub digit_relations: RelationTable<Digit>,
    /// Cluster to MC particle relations, present if the input had them.
    pub mc_relations: Option<RelationTable<McParticle>>,
    /// Cluster to true hit relations, present if the input had them.
    pub truehit_relations: Option<RelationTable<TrueHit>>,
    /// Strip groups formed.
    pub groups: usize,
    /// Groups rejected by the charge or seed cut.
    pub rejected: usize,
}

struct SideResult {
    clusters: Vec<Cluster>,
    groups: usize,
}

/// Event-level strip clusterizer.
///
/// Holds read-only configuration, calibration and geometry for a run; each
/// call to [`Clusterizer::process_event`] is independent.
pub struct Clusterizer<'a> {
    config: ClusterizerConfig,
    fitter: TimePdfFitter,
    calibration: &'a dyn StripCalibration,
    geometry: &'a dyn SensorGeometry,
}

impl<'a> Clusterizer<'a> {
    /// Creates a clusterizer with the default time binning.
    #[must_use]
    pub fn new(
        config: ClusterizerConfig,
        calibration: &'a dyn StripCalibration,
        geometry: &'a dyn SensorGeometry,
    ) -> Self {
        let fitter = TimePdfFitter::new(&TimeFitterConfig::default(), config.time_estimator);
        Self {
            config,
            fitter,
            calibration,
            geometry,
        }
    }

    /// Replaces the time binning.
    #[must_use]
    pub fn with_time_fitter(mut self, config: &TimeFitterConfig) -> Self {
        self.fitter = TimePdfFitter::new(config, self.config.time_estimator);
        self
    }

    /// Clustering configuration.
    #[must_use]
    pub fn config(&self) -> &ClusterizerConfig {
        &self.config
    }

    /// Time fitter shared by unpacking and clustering.
    #[must_use]
    pub fn fitter(&self) -> &TimePdfFitter {
        &self.fitter
    }

    /// Unpacker using this clusterizer's fitter, calibration and pulse shapes.
    #[must_use]
    pub fn unpacker<'u>(&'u self, config: &'u UnpackerConfig, map: &'u ChannelMap) -> Unpacker<'u> {
        Unpacker::new(config, map, self.calibration, &self.fitter, &self.config)
    }

    /// Clusters one event.
    ///
    /// # Errors
    /// Fails if a clustered digit has no raw samples or carries a time PDF
    /// with the wrong number of bins. Nothing is emitted for the event then.
    pub fn process_event(&self, input: &EventInput<'_>) -> Result<EventOutput> {
        let digits = input.digits;
        let builder = ClusterBuilder::new(&self.config, &self.fitter, self.calibration, self.geometry);

        let mut order: Vec<usize> = (0..digits.len()).collect();
        order.sort_by_key(|&i| digits[i].sort_key());
        let sides: Vec<&[usize]> = order
            .chunk_by(|&a, &b| digits[a].key() == digits[b].key())
            .collect();

        let per_side = if self.config.parallel {
            sides
                .par_iter()
                .map(|side| Self::cluster_side(&builder, side, input))
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            sides
                .iter()
                .map(|side| Self::cluster_side(&builder, side, input))
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut output = EventOutput::default();
        for side in per_side {
            output.groups += side.groups;
            output.clusters.extend(side.clusters);
        }
        output.rejected = output.groups - output.clusters.len();

        for (index, cluster) in output.clusters.iter().enumerate() {
            output
                .digit_relations
                .add(index, cluster.strips.iter().map(|s| (s.digit, s.amplitude)));
        }
        output.mc_relations = input
            .mc_relations
            .map(|table| propagate(table, &output.clusters, digits.len()));
        output.truehit_relations = input
            .truehit_relations
            .map(|table| propagate(table, &output.clusters, digits.len()));

        log::debug!(
            "{} digits on {} sensor sides: {} groups, {} clusters",
            digits.len(),
            sides.len(),
            output.groups,
            output.clusters.len()
        );
        Ok(output)
    }

    fn cluster_side(
        builder: &ClusterBuilder<'_>,
        side: &[usize],
        input: &EventInput<'_>,
    ) -> std::result::Result<SideResult, ClusteringError> {
        let groups = group_strips(side, |&i| input.digits[i].strip);
        let mut clusters = Vec::new();
        for range in &groups {
            if let Some(cluster) = builder.build(&side[range.clone()], input.digits, input.raw)? {
                clusters.push(cluster);
            }
        }
        Ok(SideResult {
            clusters,
            groups: groups.len(),
        })
    }
}

/// Carries digit relations over to clusters, summing weights per target.
fn propagate<T: RelationTarget>(
    table: &RelationTable<T>,
    clusters: &[Cluster],
    digit_count: usize,
) -> RelationTable<T> {
    let lookup = table.build_lookup(digit_count);
    let mut out = RelationTable::new();
    for (index, cluster) in clusters.iter().enumerate() {
        let mut sums = BTreeMap::new();
        for strip in &cluster.strips {
            lookup.accumulate_into(strip.digit, &mut sums);
        }
        if !sums.is_empty() {
            out.add(index, sums);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use svdreco_core::{ConstantCalibration, SensorId, Side, StripGeometry};

    fn digit(sensor: SensorId, side: Side, strip: u16, raw_index: usize) -> StripDigit {
        let mut pdf = vec![0.0; 100];
        pdf[50] = 1.0;
        StripDigit::new(sensor, side, strip, Some(raw_index), pdf)
    }

    fn record(fitter: &TimePdfFitter, amplitude: f64) -> RawApvSamples {
        let mut samples = [0.0; 6];
        for (i, s) in samples.iter_mut().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 * TimeFitterConfig::APV_SAMPLE_INTERVAL_NS - fitter.bin_centers()[50];
            *s = amplitude * crate::fitter::beta_prime_waveform(t, 1.988 * 135.8);
        }
        RawApvSamples::new(0, 0, 0, samples)
    }

    #[test]
    fn test_digits_in_any_order_are_split_per_side() {
        let calibration = ConstantCalibration {
            noise_adu: 1.0,
            electrons_per_adu: 1.0,
            ..Default::default()
        };
        let geometry = StripGeometry::default();
        let clusterizer = Clusterizer::new(ClusterizerConfig::default(), &calibration, &geometry);
        let s1 = SensorId::new(3, 1, 1);
        let s2 = SensorId::new(4, 1, 1);

        let raw: Vec<_> = (0..4).map(|_| record(clusterizer.fitter(), 20.0)).collect();
        // Strip 5 on both sides of s1 is not one group; s2 comes first.
        let digits = vec![
            digit(s1, Side::V, 5, 0),
            digit(s2, Side::U, 9, 1),
            digit(s1, Side::U, 6, 2),
            digit(s1, Side::U, 5, 3),
        ];
        let output = clusterizer
            .process_event(&EventInput::new(&digits, &raw))
            .unwrap();

        let keys: Vec<_> = output
            .clusters
            .iter()
            .map(|c| (c.sensor, c.side, c.size))
            .collect();
        assert_eq!(
            keys,
            vec![(s1, Side::U, 2), (s1, Side::V, 1), (s2, Side::U, 1)]
        );
        assert_eq!(output.groups, 3);
        assert_eq!(output.rejected, 0);
        assert_eq!(output.clusters[0].strips[0].digit, 3);
        assert!(output.mc_relations.is_none());
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let calibration = ConstantCalibration::default();
        let geometry = StripGeometry::default();
        let parallel = Clusterizer::new(ClusterizerConfig::default(), &calibration, &geometry);
        let sequential = Clusterizer::new(
            ClusterizerConfig::default().with_parallel(false),
            &calibration,
            &geometry,
        );

        let mut digits = Vec::new();
        let mut raws = Vec::new();
        for ladder in 1..=4 {
            for strip in [10, 11, 12, 40] {
                raws.push(record(parallel.fitter(), 30.0));
                digits.push(digit(SensorId::new(5, ladder, 2), Side::V, strip, raws.len() - 1));
            }
        }
        let input = EventInput::new(&digits, &raws);
        let a = parallel.process_event(&input).unwrap();
        let b = sequential.process_event(&input).unwrap();
        assert_eq!(a.clusters, b.clusters);
        assert_eq!(a.groups, 8);
    }
}
