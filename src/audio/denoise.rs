//! Noise gate applied to recorded chunks

/// Attenuates chunks whose level stays near the running noise floor.
///
/// The floor follows quiet chunks immediately and rises slowly during
/// speech, so short pauses between words are suppressed while speech
/// passes through untouched.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    floor: Option<f32>,
    /// Chunks below `floor * threshold` are treated as noise
    threshold: f32,
    /// Gain applied to noise chunks
    attenuation: f32,
    /// How fast the floor rises towards louder chunks
    rise: f32,
}

impl NoiseGate {
    pub fn new() -> Self {
        Self {
            floor: None,
            threshold: 2.0,
            attenuation: 0.1,
            rise: 0.05,
        }
    }

    /// Current noise floor estimate (RMS)
    #[cfg(test)]
    pub fn floor(&self) -> Option<f32> {
        self.floor
    }

    pub fn process(&mut self, chunk: &mut [i16]) {
        if chunk.is_empty() {
            return;
        }

        let level = rms(chunk);
        let floor = match self.floor {
            Some(floor) if level >= floor => floor + (level - floor) * self.rise,
            _ => level,
        };
        self.floor = Some(floor);

        if level < floor * self.threshold {
            for sample in chunk.iter_mut() {
                *sample = (f32::from(*sample) * self.attenuation) as i16;
            }
        }
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new()
    }
}

fn rms(chunk: &[i16]) -> f32 {
    let sum: f64 = chunk.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / chunk.len() as f64).sqrt() as f32
}
