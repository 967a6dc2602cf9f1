use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use raman_glucose::config::{DespikeConfig, EmscConfig, PipelineConfig, ReferenceSource};
use raman_glucose::data::naming::FileNameSchema;
use raman_glucose::pipeline;
use raman_glucose::{ReferenceRole, WindowLength};

const STAMP: &str = "2024_03_19_08_00_00_01";

fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    (-(x - mu).powi(2) / (2.0 * sigma * sigma)).exp()
}

fn raw_shift() -> Vec<f64> {
    (0..2001).map(|i| 400.0 + i as f64 * 0.7).collect()
}

fn glucose(x: f64) -> f64 {
    gaussian(x, 520.0, 7.0) * 0.7 + gaussian(x, 1060.0, 8.0) * 0.8 + gaussian(x, 1125.0, 7.0)
}

fn skin(x: f64) -> f64 {
    gaussian(x, 1003.0, 4.0) * 0.9 + gaussian(x, 1450.0, 15.0) * 0.8 + gaussian(x, 1655.0, 18.0) * 0.7
}

fn baseline(x: f64) -> f64 {
    let u = (x - 1100.0) / 700.0;
    40.0 + 25.0 * u - 10.0 * u * u
}

/// Descending, tab-separated, as exported by the spectrometer.
fn write_file(path: &Path, f: impl Fn(f64) -> f64) {
    let text: String = raw_shift()
        .iter()
        .rev()
        .map(|&x| format!("{x}\t{}\n", f(x)))
        .collect();
    std::fs::write(path, text).unwrap();
}

/// `(exposure, accumulation)` per finger file; spike added to file `spiked`.
fn fixture(dir: &Path, acquisitions: &[(u32, u32)], spiked: Option<usize>) -> PipelineConfig {
    let glucose_path = dir.join(format!("glucose_600_785 nm_60 s_1_{STAMP}.txt"));
    let skin_path = dir.join(format!("skin_600_785 nm_60 s_1_{STAMP}.txt"));
    write_file(&glucose_path, |x| 1000.0 * glucose(x));
    write_file(&skin_path, |x| 1000.0 * skin(x));

    let mut samples = Vec::new();
    for (n, &(exposure, accumulation)) in acquisitions.iter().enumerate() {
        let path = dir.join(format!(
            "7_600_785 nm_{exposure} s_{accumulation}_2024_03_19_08_{:02}_00_01.txt",
            30 + n
        ));
        let t = f64::from(exposure);
        let spike_at = raw_shift()[900];
        let spike = spiked == Some(n);
        write_file(&path, |x| {
            let v = t * (0.8 * glucose(x) + 6.0 * skin(x) + baseline(x));
            if spike && x == spike_at {
                v + 20_000.0
            } else {
                v
            }
        });
        samples.push(path);
    }

    PipelineConfig {
        samples,
        references: vec![
            ReferenceSource {
                path: glucose_path,
                name: None,
                role: None,
            },
            ReferenceSource {
                path: skin_path,
                name: None,
                role: None,
            },
        ],
        schema: FileNameSchema::finger(),
        reference_schema: FileNameSchema::reference(),
        step: 1.0,
        range: Some([500.0, 1700.0]),
        despike: None,
        emsc: EmscConfig::default(),
        output: dir.join("corrected.csv"),
    }
}

#[test]
fn recovers_analyte_from_merged_measurements() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture(dir.path(), &[(60, 1), (60, 2), (30, 1)], None);
    config.emsc.normalize = false;

    let output = pipeline::run(&config).unwrap();
    let report = &output.report;

    assert_eq!(report.name, "7");
    assert_eq!(report.acquisition.exposure, 90);
    assert_eq!(report.acquisition.accumulation, 3);
    assert_eq!(report.sources.len(), 3);
    assert_eq!(report.points, 1201);
    assert_eq!(report.raman_range, Some((500.0, 1700.0)));
    assert_eq!(report.baseline.len(), 6);
    assert!(report.score > 0.999_999);

    assert_eq!(report.references[0].name, "glucose");
    assert_eq!(report.references[0].role, ReferenceRole::Analyte);
    assert_eq!(report.references[1].role, ReferenceRole::Interferent);
    assert_relative_eq!(report.references[0].coefficient, 90.0 * 0.8 / 1000.0, max_relative = 1e-3);
    assert_relative_eq!(report.references[1].coefficient, 90.0 * 6.0 / 1000.0, max_relative = 1e-3);

    // Without normalisation the corrected signal is the glucose reference.
    for (x, v) in output.composite.x().iter().zip(&output.corrected) {
        assert!((v - 1000.0 * glucose(*x)).abs() < 5.0, "at {x}: {v}");
    }
}

#[test]
fn normalised_output_spans_unit_interval() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), &[(60, 1)], None);
    let output = pipeline::run(&config).unwrap();

    let min = output.corrected.iter().copied().fold(f64::INFINITY, f64::min);
    let max = output.corrected.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_relative_eq!(min, 0.0);
    assert_relative_eq!(max, 1.0);
    let peak = output
        .corrected
        .iter()
        .position(|&v| v == max)
        .map(|i| output.composite.x()[i]);
    assert_eq!(peak, Some(1125.0));
}

#[test]
fn despiking_removes_cosmic_ray() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture(dir.path(), &[(60, 1), (60, 1)], Some(1));
    config.emsc.normalize = false;
    config.despike = Some(DespikeConfig {
        window_length: WindowLength::Auto,
        threshold: 3.0,
    });

    let output = pipeline::run(&config).unwrap();
    assert!(output.report.score > 0.99);
    assert_relative_eq!(
        output.report.references[0].coefficient,
        60.0 * 0.8 / 1000.0,
        max_relative = 0.1
    );
}

#[test]
fn explicit_role_selects_analyte() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture(dir.path(), &[(60, 1)], None);
    config.references[1].role = Some(ReferenceRole::Analyte);
    config.references[1].name = Some("tissue".to_string());

    let output = pipeline::run(&config).unwrap();
    let roles: Vec<_> = output
        .report
        .references
        .iter()
        .map(|r| (r.name.as_str(), r.role))
        .collect();
    assert_eq!(
        roles,
        [
            ("glucose", ReferenceRole::Interferent),
            ("tissue", ReferenceRole::Analyte)
        ]
    );
}

#[test]
fn range_outside_data_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fixture(dir.path(), &[(60, 1)], None);
    config.range = Some([3000.0, 3100.0]);
    assert!(pipeline::run(&config).is_err());
}

#[test]
fn writes_csv_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), &[(60, 1), (30, 1)], None);
    let output = pipeline::run(&config).unwrap();
    pipeline::write_outputs(&output, &config.output).unwrap();

    let mut reader = csv::Reader::from_path(&config.output).unwrap();
    assert_eq!(
        reader.headers().unwrap().iter().collect::<Vec<_>>(),
        ["raman_shift", "intensity"]
    );
    let rows: Vec<(f64, f64)> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), output.report.points);
    assert_eq!(rows[0].0, 500.0);

    let report_path: PathBuf = config.output.with_extension("json");
    let report: serde_json::Value =
        serde_json::from_reader(std::fs::File::open(report_path).unwrap()).unwrap();
    assert_eq!(report["acquisition"]["exposure"], 90);
    assert_eq!(report["references"][0]["role"], "analyte");
    assert!(report["score"].as_f64().unwrap() > 0.999);
}

#[test]
fn config_file_drives_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = fixture(dir.path(), &[(60, 1)], None);
    let path = dir.path().join("run.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = PipelineConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(pipeline::run(&loaded).is_ok());
}
