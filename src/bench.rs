//! Key generation and encapsulation timing across algorithms.

use crate::error::{Error, Result};
use crate::keys::{self, Algorithm};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// Mean timings and sizes for one algorithm.
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmBench {
    pub algorithm: Algorithm,
    pub quantum_safe: bool,
    pub keygen_ms: f64,
    pub encapsulate_ms: f64,
    pub decapsulate_ms: f64,
    pub public_key_bytes: usize,
    pub ciphertext_bytes: usize,
}

/// Which timing to compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Keygen,
    Encapsulate,
    Decapsulate,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Keygen, Metric::Encapsulate, Metric::Decapsulate];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Keygen => "Key generation",
            Metric::Encapsulate => "Encapsulation",
            Metric::Decapsulate => "Decapsulation",
        }
    }
}

impl AlgorithmBench {
    pub fn millis(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Keygen => self.keygen_ms,
            Metric::Encapsulate => self.encapsulate_ms,
            Metric::Decapsulate => self.decapsulate_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub iterations: usize,
    pub results: Vec<AlgorithmBench>,
}

impl BenchReport {
    pub fn get(&self, algorithm: Algorithm) -> Option<&AlgorithmBench> {
        self.results.iter().find(|r| r.algorithm == algorithm)
    }

    /// How many times slower `b` is than `a` on `metric`.
    pub fn ratio(&self, a: Algorithm, b: Algorithm, metric: Metric) -> Option<f64> {
        let a = self.get(a)?.millis(metric);
        let b = self.get(b)?.millis(metric);
        if a > 0.0 {
            Some(b / a)
        } else {
            None
        }
    }
}

/// Time `iterations` rounds of keygen, encapsulate and decapsulate for each
/// algorithm.
pub fn run(algorithms: &[Algorithm], iterations: usize) -> Result<BenchReport> {
    if iterations == 0 {
        return Err(Error::InvalidConfig(
            "benchmark needs at least one iteration".to_string(),
        ));
    }

    let mut results = Vec::with_capacity(algorithms.len());
    for &algorithm in algorithms {
        info!(algorithm = %algorithm, iterations, "benchmarking");
        results.push(bench_one(algorithm, iterations)?);
    }

    Ok(BenchReport {
        iterations,
        results,
    })
}

fn bench_one(algorithm: Algorithm, iterations: usize) -> Result<AlgorithmBench> {
    let mut keygen = 0.0;
    let mut encapsulate = 0.0;
    let mut decapsulate = 0.0;
    let mut public_key_bytes = 0;
    let mut ciphertext_bytes = 0;

    for _ in 0..iterations {
        let start = Instant::now();
        let pair = keys::generate(algorithm)?;
        keygen += elapsed_ms(start);

        let start = Instant::now();
        let (ciphertext, sent) = pair.encapsulate()?;
        encapsulate += elapsed_ms(start);

        let start = Instant::now();
        let received = pair.decapsulate(&ciphertext)?;
        decapsulate += elapsed_ms(start);

        if *sent != *received {
            return Err(Error::InternalCryptoFailure(format!(
                "{} benchmark: shared secrets differ",
                algorithm
            )));
        }

        public_key_bytes = pair.public_key_bytes()?.len();
        ciphertext_bytes = ciphertext.len();
    }

    let n = iterations as f64;
    Ok(AlgorithmBench {
        algorithm,
        quantum_safe: algorithm.is_quantum_safe(),
        keygen_ms: keygen / n,
        encapsulate_ms: encapsulate / n,
        decapsulate_ms: decapsulate / n,
        public_key_bytes,
        ciphertext_bytes,
    })
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
