use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use raman_glucose::config::{DespikeConfig, EmscConfig, PipelineConfig, ReferenceSource};
use raman_glucose::data::naming::FileNameSchema;
use raman_glucose::processing::despike::WindowLength;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn peaks(shift: &[f64], peaks: &[(f64, f64, f64)]) -> Vec<f64> {
    shift
        .iter()
        .map(|&x| peaks.iter().map(|&(mu, sigma, amp)| gaussian(x, mu, sigma, amp)).sum())
        .collect()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Two tab-separated columns, highest shift first as the spectrometer
/// exports them.
fn write_spectrum(path: &Path, shift: &[f64], intensity: &[f64]) -> Result<()> {
    let mut text = String::new();
    for (x, y) in shift.iter().zip(intensity).rev() {
        writeln!(text, "{x:.4}\t{y:.4}")?;
    }
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "sample_data".into()));
    let ref_dir = out_dir.join("ref");
    let finger_dir = out_dir.join("finger");
    std::fs::create_dir_all(&ref_dir)?;
    std::fs::create_dir_all(&finger_dir)?;

    let mut rng = SimpleRng::new(42);

    // Instrument grid: 400 → 1800 cm⁻¹, 0.7 cm⁻¹ apart
    let shift: Vec<f64> = (0..2001).map(|i| 400.0 + i as f64 * 0.7).collect();

    let glucose = peaks(
        &shift,
        &[
            (423.0, 6.0, 0.5),
            (520.0, 7.0, 0.7),
            (911.0, 6.0, 0.6),
            (1060.0, 8.0, 0.8),
            (1125.0, 7.0, 1.0),
            (1365.0, 9.0, 0.4),
        ],
    );
    let skin = peaks(
        &shift,
        &[
            (1003.0, 4.0, 0.9),
            (1250.0, 20.0, 0.5),
            (1450.0, 15.0, 0.8),
            (1655.0, 18.0, 0.7),
        ],
    );

    let reference_names = ["glucose", "skin"];
    for (name, values) in reference_names.iter().zip([&glucose, &skin]) {
        let intensity: Vec<f64> = values.iter().map(|v| 1000.0 * v).collect();
        let path = ref_dir.join(format!("{name}_600_785 nm_60 s_1_2024_03_19_08_00_00_01.txt"));
        write_spectrum(&path, &shift, &intensity)?;
    }

    // (exposure s, accumulation, minute)
    let acquisitions = [(60, 1, 31), (60, 2, 33), (60, 1, 36), (30, 1, 38), (30, 3, 40)];
    let mut samples = Vec::with_capacity(acquisitions.len());
    for (n, &(exposure, accumulation, minute)) in acquisitions.iter().enumerate() {
        let t = f64::from(exposure);
        let mut intensity: Vec<f64> = shift
            .iter()
            .zip(glucose.iter().zip(&skin))
            .map(|(&x, (g, s))| {
                let u = (x - 1100.0) / 700.0;
                let baseline = 40.0 + 25.0 * u - 10.0 * u * u;
                t * (0.8 * g + 6.0 * s + baseline) + rng.gauss(0.0, 2.0)
            })
            .collect();
        if n == 2 {
            // Cosmic ray
            intensity[900] += 20_000.0;
        }
        let file = format!(
            "0_600_785 nm_{exposure} s_{accumulation}_2024_03_19_08_{minute:02}_00_01.txt"
        );
        let path = finger_dir.join(&file);
        write_spectrum(&path, &shift, &intensity)?;
        samples.push(PathBuf::from("finger").join(file));
    }

    let config = PipelineConfig {
        samples,
        references: reference_names
            .iter()
            .map(|name| ReferenceSource {
                path: PathBuf::from("ref")
                    .join(format!("{name}_600_785 nm_60 s_1_2024_03_19_08_00_00_01.txt")),
                name: None,
                role: None,
            })
            .collect(),
        schema: FileNameSchema::finger(),
        reference_schema: FileNameSchema::reference(),
        step: 1.0,
        range: Some([500.0, 1700.0]),
        despike: Some(DespikeConfig {
            window_length: WindowLength::Auto,
            threshold: 3.0,
        }),
        emsc: EmscConfig::default(),
        output: PathBuf::from("corrected.csv"),
    };
    let config_path = out_dir.join("config.json");
    let file = std::fs::File::create(&config_path)
        .with_context(|| format!("creating {}", config_path.display()))?;
    serde_json::to_writer_pretty(file, &config)?;

    println!(
        "Wrote {} references and {} finger spectra ({} points each) to {}",
        reference_names.len(),
        acquisitions.len(),
        shift.len(),
        out_dir.display()
    );
    Ok(())
}
