use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Segments whose earnings are hit hardest by rising policy rates.
const RATE_SENSITIVE_SEGMENTS: [&str; 16] = [
    "Alimentos",
    "Eletrodomésticos",
    "Exploração de Imóveis",
    "Exploração de Rodovias",
    "Incorporações",
    "Linhas Aéreas de Passageiros",
    "Madeira",
    "Máq. e Equip. Industriais",
    "Material Aeronáutico e de Defesa",
    "Material Rodoviário",
    "Produtos de Cuidado Pessoal",
    "Produtos Diversos",
    "Serviços Educacionais",
    "Serviços Financeiros Diversos",
    "Tecidos, Vestuário e Calçados",
    "Viagens e Turismo",
];

/// Clamp `x` to `[x_inf, x_sup]` and interpolate linearly between
/// `y_inf` and `y_sup`, rounded to three decimals.
///
/// ```
/// use equity_engine_core::signals::linear_adjust;
/// assert_eq!(linear_adjust(3.0, 2.0, 4.0, 1.0, 0.5), 0.75);
/// assert_eq!(linear_adjust(9.0, 2.0, 4.0, 1.0, 0.5), 0.5);
/// ```
pub fn linear_adjust(x: f64, x_inf: f64, x_sup: f64, y_inf: f64, y_sup: f64) -> f64 {
    if x <= x_inf {
        return y_inf;
    }
    if x >= x_sup {
        return y_sup;
    }
    let y = y_inf + (x - x_inf) * (y_sup - y_inf) / (x_sup - x_inf);
    (y * 1000.0).round() / 1000.0
}

/// A clamped linear ramp between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearRamp {
    pub x_lower: f64,
    pub x_upper: f64,
    pub y_lower: f64,
    pub y_upper: f64,
}

impl LinearRamp {
    pub fn apply(&self, x: f64) -> f64 {
        linear_adjust(x, self.x_lower, self.x_upper, self.y_lower, self.y_upper)
    }
}

/// Shape of the rate-hike penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatePenaltyParameters {
    /// Hike probability at or below which the full bonus applies.
    pub lower: f64,
    /// Hike probability at or above which the full penalty applies.
    pub upper: f64,
    /// Where sensitive segments switch to the steep branch.
    pub kink: f64,
    pub neutral_start: f64,
    pub neutral_end: f64,
    pub sensitive_start: f64,
    pub sensitive_kink: f64,
    pub sensitive_end: f64,
    pub sensitive_segments: BTreeSet<String>,
}

impl Default for RatePenaltyParameters {
    fn default() -> Self {
        Self {
            lower: 0.2,
            upper: 0.8,
            kink: 0.4,
            neutral_start: 1.1,
            neutral_end: 0.9,
            sensitive_start: 1.1,
            sensitive_kink: 1.0,
            sensitive_end: 0.2,
            sensitive_segments: RATE_SENSITIVE_SEGMENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Turns the rate-hike probability into a return multiplier per segment.
#[derive(Debug, Clone, Default)]
pub struct MacroAdjustmentEstimator {
    params: RatePenaltyParameters,
}

impl MacroAdjustmentEstimator {
    pub fn new(params: RatePenaltyParameters) -> Self {
        Self { params }
    }

    pub fn is_rate_sensitive(&self, segment: &str) -> bool {
        self.params.sensitive_segments.contains(segment)
    }

    pub fn rate_penalty(&self, hike_probability: f64, segment: &str) -> f64 {
        let p = &self.params;
        if self.is_rate_sensitive(segment) {
            if hike_probability <= p.kink {
                linear_adjust(hike_probability, p.lower, p.kink, p.sensitive_start, p.sensitive_kink)
            } else {
                linear_adjust(hike_probability, p.kink, p.upper, p.sensitive_kink, p.sensitive_end)
            }
        } else {
            linear_adjust(hike_probability, p.lower, p.upper, p.neutral_start, p.neutral_end)
        }
    }
}
