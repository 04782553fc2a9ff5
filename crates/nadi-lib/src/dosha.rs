//! Deterministic Vata/Pitta/Kapha scoring over finished pulse metrics.

use serde::{Deserialize, Serialize};

/// Spread (max - min percent) at or below which no bucket dominates.
pub const BALANCED_SPREAD: u8 = 20;

/// The fused, final physiological reading of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseMetrics {
    pub heart_rate_bpm: u32,
    pub hrv_ms: f64,
    /// Pulse strength in [0,1]
    pub pulse_strength: f64,
    /// Beat regularity in [0,1]
    pub regularity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dosha {
    Vata,
    Pitta,
    Kapha,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoshaScore {
    pub vata: u8,
    pub pitta: u8,
    pub kapha: u8,
    pub dominant: Dosha,
}

impl DoshaScore {
    pub fn total(&self) -> u32 {
        self.vata as u32 + self.pitta as u32 + self.kapha as u32
    }
}

/// Raw point allocation before normalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DoshaPoints {
    pub vata: f64,
    pub pitta: f64,
    pub kapha: f64,
}

impl DoshaPoints {
    pub fn total(&self) -> f64 {
        self.vata + self.pitta + self.kapha
    }
}

pub fn dosha_points(metrics: &PulseMetrics) -> DoshaPoints {
    let mut pts = DoshaPoints::default();

    match metrics.heart_rate_bpm {
        hr if hr > 80 => pts.vata += 30.0,
        70..=80 => pts.pitta += 30.0,
        _ => pts.kapha += 30.0,
    }

    if metrics.hrv_ms > 60.0 {
        pts.vata += 25.0;
    } else if metrics.hrv_ms > 35.0 {
        pts.pitta += 25.0;
    } else {
        pts.kapha += 25.0;
    }

    if metrics.regularity < 0.8 {
        pts.vata += 25.0;
    } else {
        pts.pitta += 15.0;
        pts.kapha += 10.0;
    }

    if metrics.pulse_strength < 0.6 {
        pts.vata += 20.0;
    } else if metrics.pulse_strength > 0.85 {
        pts.kapha += 20.0;
    } else {
        pts.pitta += 20.0;
    }

    pts
}

pub fn classify(metrics: &PulseMetrics) -> DoshaScore {
    score_from_points(&dosha_points(metrics))
}

/// Normalise points to integer percents summing to exactly 100, then pick the
/// dominant bucket. Ties go Vata, then Pitta, then Kapha.
pub fn score_from_points(pts: &DoshaPoints) -> DoshaScore {
    let total = pts.total();
    let mut pct = if total > 0.0 {
        [
            (pts.vata / total * 100.0).round() as i32,
            (pts.pitta / total * 100.0).round() as i32,
            (pts.kapha / total * 100.0).round() as i32,
        ]
    } else {
        [34, 33, 33]
    };

    let drift = 100 - pct.iter().sum::<i32>();
    if drift != 0 {
        let largest = argmax(&pct);
        pct[largest] += drift;
    }

    let max = *pct.iter().max().unwrap_or(&0);
    let min = *pct.iter().min().unwrap_or(&0);
    let dominant = if max - min <= BALANCED_SPREAD as i32 {
        Dosha::Balanced
    } else {
        [Dosha::Vata, Dosha::Pitta, Dosha::Kapha][argmax(&pct)]
    };

    DoshaScore {
        vata: pct[0].clamp(0, 100) as u8,
        pitta: pct[1].clamp(0, 100) as u8,
        kapha: pct[2].clamp(0, 100) as u8,
        dominant,
    }
}

fn argmax(values: &[i32; 3]) -> usize {
    let mut best = 0;
    for i in 1..values.len() {
        if values[i] > values[best] {
            best = i;
        }
    }
    best
}
