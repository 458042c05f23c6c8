//! Cluster and relation writers.

use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use svdreco_algorithms::EventOutput;
use svdreco_core::{Cluster, RelationTable, RelationTarget, Side};

/// Size of one binary cluster record in bytes.
pub const BINARY_RECORD_SIZE: usize = 4 + 2 + 1 + 9 * 8 + 2;

const CLUSTER_HEADER: &str = "event,sensor,side,position,position_error,time,time_error,charge,\
charge_error,seed_charge,size,signal_to_noise,chi2,first_strip";

/// Cluster output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Comma-separated text with a header line.
    #[default]
    Csv,
    /// Fixed-size little-endian records.
    Binary,
}

/// Writer for reconstructed clusters.
pub struct ClusterFileWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
    header_written: bool,
}

impl ClusterFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            format,
            header_written: false,
        })
    }

    /// Writes the clusters of one event.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_event(&mut self, event: usize, clusters: &[Cluster]) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv(event, clusters),
            OutputFormat::Binary => self.write_binary(event, clusters),
        }
    }

    fn write_csv(&mut self, event: usize, clusters: &[Cluster]) -> Result<()> {
        if !self.header_written {
            writeln!(self.writer, "{CLUSTER_HEADER}")?;
            self.header_written = true;
        }
        for c in clusters {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                event,
                c.sensor,
                c.side,
                c.position,
                c.position_error,
                c.time,
                c.time_error,
                c.charge,
                c.charge_error,
                c.seed_charge,
                c.size,
                c.signal_to_noise,
                c.chi2,
                c.first_strip().unwrap_or_default()
            )?;
        }
        Ok(())
    }

    /// Format per cluster: u32 event, u16 packed sensor id, u8 side (0 = U),
    /// nine f64 (position, position error, time, time error, charge, charge
    /// error, seed charge, S/N, chi2), u16 size.
    #[allow(clippy::cast_possible_truncation)]
    fn write_binary(&mut self, event: usize, clusters: &[Cluster]) -> Result<()> {
        for c in clusters {
            self.writer.write_all(&(event as u32).to_le_bytes())?;
            self.writer.write_all(&c.sensor.to_packed().to_le_bytes())?;
            self.writer.write_all(&[u8::from(c.side == Side::V)])?;
            for value in [
                c.position,
                c.position_error,
                c.time,
                c.time_error,
                c.charge,
                c.charge_error,
                c.seed_charge,
                c.signal_to_noise,
                c.chi2,
            ] {
                self.writer.write_all(&value.to_le_bytes())?;
            }
            self.writer.write_all(&c.size.to_le_bytes())?;
        }
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Writer for cluster relations as `event,cluster,kind,target,weight` rows.
pub struct RelationFileWriter {
    writer: BufWriter<File>,
}

impl RelationFileWriter {
    /// Creates the file and writes the header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "event,cluster,kind,target,weight")?;
        Ok(Self { writer })
    }

    /// Writes every relation table of one event.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_event(&mut self, event: usize, output: &EventOutput) -> Result<()> {
        self.write_table(event, &output.digit_relations)?;
        if let Some(table) = &output.mc_relations {
            self.write_table(event, table)?;
        }
        if let Some(table) = &output.truehit_relations {
            self.write_table(event, table)?;
        }
        Ok(())
    }

    fn write_table<T: RelationTarget>(
        &mut self,
        event: usize,
        table: &RelationTable<T>,
    ) -> Result<()> {
        let kind = table.kind();
        for (cluster, target, weight) in table.iter_edges() {
            writeln!(self.writer, "{event},{cluster},{kind},{target},{weight}")?;
        }
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svdreco_core::relation::target::McParticle;
    use svdreco_core::{SensorId, StripContribution};
    use tempfile::NamedTempFile;

    fn cluster() -> Cluster {
        Cluster {
            sensor: SensorId::new(3, 1, 2),
            side: Side::V,
            position: 0.25,
            position_error: 0.002,
            time: -3.5,
            time_error: 1.5,
            charge: 30000.0,
            charge_error: 1200.0,
            seed_charge: 18000.0,
            size: 2,
            signal_to_noise: 25.0,
            chi2: 0.75,
            strips: vec![
                StripContribution {
                    digit: 4,
                    strip: 100,
                    amplitude: 12000.0,
                },
                StripContribution {
                    digit: 5,
                    strip: 101,
                    amplitude: 18000.0,
                },
            ],
        }
    }

    #[test]
    fn test_write_clusters_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ClusterFileWriter::create(file.path(), OutputFormat::Csv).unwrap();
        writer.write_event(0, &[cluster()]).unwrap();
        writer.write_event(1, &[cluster()]).unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("event,sensor,side,position"));
        assert_eq!(
            lines[1],
            "0,3.1.2,V,0.25,0.002,-3.5,1.5,30000,1200,18000,2,25,0.75,100"
        );
        assert!(lines[2].starts_with("1,3.1.2,V"));
    }

    #[test]
    fn test_write_clusters_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = ClusterFileWriter::create(file.path(), OutputFormat::Binary).unwrap();
        writer.write_event(7, &[cluster(), cluster()]).unwrap();
        writer.flush().unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), 2 * BINARY_RECORD_SIZE);
        assert_eq!(&data[0..4], &7u32.to_le_bytes());
        assert_eq!(
            &data[4..6],
            &SensorId::new(3, 1, 2).to_packed().to_le_bytes()
        );
        assert_eq!(data[6], 1);
        assert_eq!(&data[7..15], &0.25f64.to_le_bytes());
    }

    #[test]
    fn test_write_relations() {
        let mut output = EventOutput::default();
        output.digit_relations.add(0, [(4, 12000.0), (5, 18000.0)]);
        let mut mc = RelationTable::<McParticle>::new();
        mc.add(0, [(9, 2.5)]);
        output.mc_relations = Some(mc);

        let file = NamedTempFile::new().unwrap();
        let mut writer = RelationFileWriter::create(file.path()).unwrap();
        writer.write_event(3, &output).unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(
            content,
            "event,cluster,kind,target,weight\n\
             3,0,digit,4,12000\n\
             3,0,digit,5,18000\n\
             3,0,mcparticle,9,2.5\n"
        );
    }
}
