use std::io::Write;
use svdreco_algorithms::{Clusterizer, EventInput};
use svdreco_core::{ConstantCalibration, StripGeometry};
use svdreco_io::{read_events, ClusterFileWriter, OutputFormat, RelationFileWriter, RunConfig};

// The digits carry no time PDFs; they are derived from the raw samples.
const EVENTS: &str = r#"[
  {
    "raw": [
      {"fadc": 3, "apv": 0, "channel": 10, "samples": [0, 60, 90, 83, 64, 47]},
      {"fadc": 3, "apv": 0, "channel": 11, "samples": [0, 240, 360, 332, 256, 188]},
      {"fadc": 3, "apv": 0, "channel": 12, "samples": [0, 60, 90, 83, 64, 47]}
    ],
    "digits": [
      {"sensor": {"layer": 3, "ladder": 2, "sensor": 1}, "side": "U", "strip": 11, "raw_index": 1},
      {"sensor": {"layer": 3, "ladder": 2, "sensor": 1}, "side": "U", "strip": 10, "raw_index": 0},
      {"sensor": {"layer": 3, "ladder": 2, "sensor": 1}, "side": "U", "strip": 12, "raw_index": 2}
    ],
    "mc_relations": [
      {"from": 0, "to": [4], "weights": [2.0]},
      {"from": 1, "to": [4, 6], "weights": [1.0, -1.0]}
    ]
  },
  {"raw": [], "digits": []}
]"#;

#[test]
fn test_events_to_cluster_and_relation_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("events.json");
    std::fs::File::create(&input)
        .unwrap()
        .write_all(EVENTS.as_bytes())
        .unwrap();

    let config = RunConfig::from_json(r#"{"clusterizer": {"parallel": false}}"#).unwrap();
    let calibration = ConstantCalibration::default();
    let geometry = StripGeometry::default();
    let clusterizer = Clusterizer::new(config.clusterizer.clone(), &calibration, &geometry)
        .with_time_fitter(&config.time_fitter);

    let clusters_path = dir.path().join("clusters.csv");
    let relations_path = dir.path().join("relations.csv");
    let mut clusters_out = ClusterFileWriter::create(&clusters_path, OutputFormat::Csv).unwrap();
    let mut relations_out = RelationFileWriter::create(&relations_path).unwrap();

    let events = read_events(&input).unwrap();
    assert_eq!(events.len(), 2);
    let mut total = 0;
    for (index, event) in events.iter().enumerate() {
        let digits = event.digits.clone().unwrap();
        let mc = event.mc_table();
        let mut event_input = EventInput::new(&digits, &event.raw);
        if let Some(table) = &mc {
            event_input = event_input.with_mc_relations(table);
        }
        let output = clusterizer.process_event(&event_input).unwrap();
        total += output.clusters.len();
        clusters_out.write_event(index, &output.clusters).unwrap();
        relations_out.write_event(index, &output).unwrap();
    }
    clusters_out.flush().unwrap();
    relations_out.flush().unwrap();
    assert_eq!(total, 1);

    let clusters = std::fs::read_to_string(&clusters_path).unwrap();
    let rows: Vec<_> = clusters.lines().skip(1).collect();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("0,3.2.1,U,"));
    assert!(rows[0].ends_with(",10"));

    let relations = std::fs::read_to_string(&relations_path).unwrap();
    let digit_rows = relations.lines().filter(|l| l.contains(",digit,")).count();
    assert_eq!(digit_rows, 3);
    let mc_rows: Vec<_> = relations
        .lines()
        .filter(|l| l.contains(",mcparticle,"))
        .collect();
    assert_eq!(mc_rows, vec!["0,0,mcparticle,4,3"]);
}
