//! Telemetry trace to renderable sculpture.
//!
//! [`build`] is pure and deterministic: the same [`RawTrace`] always
//! yields a bit-identical [`Artifact`]. Each sample becomes one 3D point
//! whose height encodes the combined G-force at that point of the lap.

use serde::{Deserialize, Serialize};

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Readings above this are treated as sensor noise and clamped.
pub const MAX_G_FORCE: f64 = 6.0;

/// Vertical extrusion per 1 g.
pub const HEIGHT_PER_G: f64 = 50.0;

/// Curvature needs a point on each side.
pub const MIN_SAMPLES: usize = 3;

const KMH_PER_MS: f64 = 3.6;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One telemetry sample along the lap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceSample {
    /// Seconds since the start of the lap.
    pub time_s: f64,
    /// Track position in metres.
    pub x: f64,
    pub y: f64,
    pub speed_kmh: f64,
}

impl TraceSample {
    fn is_finite(&self) -> bool {
        self.time_s.is_finite() && self.x.is_finite() && self.y.is_finite() && self.speed_kmh.is_finite()
    }
}

/// Lap-level details reported alongside the trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LapSummary {
    pub lap_number: Option<u32>,
    pub lap_time_s: Option<f64>,
    pub full_name: Option<String>,
    pub team: Option<String>,
}

/// A participant's representative lap as extracted from a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrace {
    pub participant: String,
    pub lap: LapSummary,
    pub samples: Vec<TraceSample>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SculpturePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub g_force: f64,
    pub speed_kmh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStats {
    pub max_g_force: f64,
    pub avg_g_force: f64,
    pub max_speed_kmh: f64,
    pub point_count: usize,
}

/// The renderable output for one participant's lap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub participant: String,
    pub lap: LapSummary,
    pub points: Vec<SculpturePoint>,
    pub stats: ArtifactStats,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    #[error("Malformed trace: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Derive the sculpture for `trace`.
pub fn build(trace: &RawTrace) -> Result<Artifact, ArtifactError> {
    let samples = &trace.samples;
    if samples.len() < MIN_SAMPLES {
        return Err(ArtifactError::Malformed(format!(
            "trace for {} has {} samples, need at least {MIN_SAMPLES}",
            trace.participant,
            samples.len()
        )));
    }
    if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
        return Err(ArtifactError::Malformed(format!(
            "trace for {} has a non-finite value at sample {index}",
            trace.participant
        )));
    }

    let n = samples.len();
    let speeds: Vec<f64> = samples.iter().map(|s| s.speed_kmh / KMH_PER_MS).collect();

    let mut points = Vec::with_capacity(n);
    for (i, sample) in samples.iter().enumerate() {
        let prev = i.saturating_sub(1);
        let next = (i + 1).min(n - 1);

        let dt = samples[next].time_s - samples[prev].time_s;
        let longitudinal = if dt > 0.0 {
            (speeds[next] - speeds[prev]) / dt
        } else {
            0.0
        };

        let curvature = if i > 0 && i < n - 1 {
            menger_curvature(&samples[i - 1], sample, &samples[i + 1])
        } else {
            0.0
        };
        let lateral = speeds[i] * speeds[i] * curvature;

        let g_force = (longitudinal.hypot(lateral) / STANDARD_GRAVITY).min(MAX_G_FORCE);
        points.push(SculpturePoint {
            x: sample.x,
            y: sample.y,
            z: g_force * HEIGHT_PER_G,
            g_force,
            speed_kmh: sample.speed_kmh,
        });
    }

    let stats = ArtifactStats {
        max_g_force: points.iter().map(|p| p.g_force).fold(0.0, f64::max),
        avg_g_force: points.iter().map(|p| p.g_force).sum::<f64>() / n as f64,
        max_speed_kmh: samples.iter().map(|s| s.speed_kmh).fold(0.0, f64::max),
        point_count: n,
    };

    Ok(Artifact {
        participant: trace.participant.clone(),
        lap: trace.lap.clone(),
        points,
        stats,
    })
}

/// Curvature (1/radius) of the circle through three points; 0 when collinear.
fn menger_curvature(a: &TraceSample, b: &TraceSample, c: &TraceSample) -> f64 {
    let ab = (b.x - a.x).hypot(b.y - a.y);
    let bc = (c.x - b.x).hypot(c.y - b.y);
    let ca = (a.x - c.x).hypot(a.y - c.y);
    let denom = ab * bc * ca;
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    2.0 * cross.abs() / denom
}
