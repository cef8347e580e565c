//! Bin colors.
//!
//! Colors are interpolated in `OKLab` between a start and end color across
//! the bins in order. User overrides are keyed by bin label. When the bin
//! parameters change, overrides whose label no longer exists are dropped
//! and reported back to the caller; overrides for labels that survive the
//! change are kept.

use std::collections::BTreeMap;

use hexmap_aggregate_models::{Color, PaletteEntry};

use crate::bins::BinGeneration;

/// User-chosen colors for individual bin labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaletteOverrides {
    generation: Option<BinGeneration>,
    colors: BTreeMap<String, Color>,
}

impl PaletteOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the color for `label`, replacing any previous override.
    pub fn set(&mut self, label: impl Into<String>, color: Color) {
        self.colors.insert(label.into(), color);
    }

    /// Removes the override for `label`.
    pub fn remove(&mut self, label: &str) -> Option<Color> {
        self.colors.remove(label)
    }

    /// Override for `label`, if any.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<Color> {
        self.colors.get(label).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// All overrides keyed by label.
    #[must_use]
    pub const fn colors(&self) -> &BTreeMap<String, Color> {
        &self.colors
    }

    /// Bin parameters the overrides were last reconciled against.
    #[must_use]
    pub const fn generation(&self) -> Option<BinGeneration> {
        self.generation
    }

    /// Brings the overrides in line with a new set of bin labels.
    ///
    /// Drops every override whose label is not in `labels` and returns the
    /// dropped labels. Calling this with the generation the overrides are
    /// already reconciled against is a no-op.
    pub fn reconcile(&mut self, generation: BinGeneration, labels: &[String]) -> Vec<String> {
        if self.generation == Some(generation) {
            return Vec::new();
        }

        let orphaned: Vec<String> = self
            .colors
            .keys()
            .filter(|label| !labels.contains(label))
            .cloned()
            .collect();

        for label in &orphaned {
            self.colors.remove(label);
        }

        if !orphaned.is_empty() {
            log::warn!(
                "Bins changed to step={} count={}; dropped color overrides for {}",
                generation.step,
                generation.count,
                orphaned.join(", ")
            );
        }

        self.generation = Some(generation);
        orphaned
    }
}

/// Assigns one color to each label, in order.
///
/// Labels with an override keep it; every other label gets the gradient
/// color for its position, `t = i / (n - 1)` (or `t = 1` for a single
/// label). Overrides for labels not in `labels` are ignored.
#[must_use]
pub fn assign(
    labels: &[String],
    overrides: &BTreeMap<String, Color>,
    start: Color,
    end: Color,
) -> Vec<PaletteEntry> {
    let n = labels.len();

    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            if let Some(&color) = overrides.get(label) {
                return PaletteEntry {
                    label: label.clone(),
                    color,
                    overridden: true,
                };
            }

            #[allow(clippy::cast_precision_loss)]
            let t = if n <= 1 {
                1.0
            } else {
                i as f64 / (n - 1) as f64
            };

            PaletteEntry {
                label: label.clone(),
                color: interpolate(start, end, t),
                overridden: false,
            }
        })
        .collect()
}

/// Interpolates between two colors in `OKLab`. `t` is clamped to `[0, 1]`.
#[must_use]
pub fn interpolate(start: Color, end: Color, t: f64) -> Color {
    if t <= 0.0 {
        return start;
    }
    if t >= 1.0 {
        return end;
    }

    let a = Oklab::from(start);
    let b = Oklab::from(end);

    Oklab {
        l: (b.l - a.l).mul_add(t, a.l),
        a: (b.a - a.a).mul_add(t, a.a),
        b: (b.b - a.b).mul_add(t, a.b),
    }
    .into()
}

#[derive(Debug, Clone, Copy)]
struct Oklab {
    l: f64,
    a: f64,
    b: f64,
}

impl From<Color> for Oklab {
    fn from(color: Color) -> Self {
        let r = srgb_to_linear(color.r);
        let g = srgb_to_linear(color.g);
        let b = srgb_to_linear(color.b);

        let l = 0.051_445_992_9f64
            .mul_add(b, 0.412_221_470_8f64.mul_add(r, 0.536_332_536_3 * g))
            .cbrt();
        let m = 0.107_396_956_6f64
            .mul_add(b, 0.211_903_498_2f64.mul_add(r, 0.680_699_545_1 * g))
            .cbrt();
        let s = 0.629_978_700_5f64
            .mul_add(b, 0.088_302_461_9f64.mul_add(r, 0.281_718_837_6 * g))
            .cbrt();

        Self {
            l: 0.210_454_255_3f64.mul_add(l, 0.793_617_785_0f64.mul_add(m, -0.004_072_046_8 * s)),
            a: 1.977_998_495_1f64.mul_add(l, (-2.428_592_205_0f64).mul_add(m, 0.450_593_709_9 * s)),
            b: 0.025_904_037_1f64.mul_add(l, 0.782_771_766_2f64.mul_add(m, -0.808_675_766_0 * s)),
        }
    }
}

impl From<Oklab> for Color {
    fn from(lab: Oklab) -> Self {
        let l = 0.215_803_757_3f64.mul_add(lab.b, 0.396_337_777_4f64.mul_add(lab.a, lab.l));
        let m = (-0.063_854_172_8f64).mul_add(lab.b, (-0.105_561_345_8f64).mul_add(lab.a, lab.l));
        let s = (-1.291_485_548_0f64).mul_add(lab.b, (-0.089_484_177_5f64).mul_add(lab.a, lab.l));

        let (l, m, s) = (l.powi(3), m.powi(3), s.powi(3));

        let r = 0.230_969_929_2f64.mul_add(s, 4.076_741_662_1f64.mul_add(l, -3.307_711_591_3 * m));
        let g = (-0.341_319_396_5f64)
            .mul_add(s, (-1.268_438_004_6f64).mul_add(l, 2.609_757_401_1 * m));
        let b = 1.707_614_701_0f64
            .mul_add(s, (-0.004_196_086_3f64).mul_add(l, -0.703_418_614_7 * m));

        Self::rgb(linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b))
    }
}

fn srgb_to_linear(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn linear_to_srgb(channel: f64) -> u8 {
    let c = channel.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055f64.mul_add(c.powf(1.0 / 2.4), -0.055)
    };
    (encoded.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn luminance(color: Color) -> u32 {
        u32::from(color.r) + u32::from(color.g) + u32::from(color.b)
    }

    #[test]
    fn override_survives_and_gradient_stays_monotonic() {
        let black = Color::rgb(0, 0, 0);
        let white = Color::rgb(255, 255, 255);
        let red: Color = "#ff0000".parse().unwrap();
        let overrides = BTreeMap::from([("B".to_string(), red)]);

        let palette = assign(&labels(&["A", "B", "C"]), &overrides, black, white);

        assert_eq!(palette[1].color, red);
        assert!(palette[1].overridden);
        assert_eq!(palette[0].color, black);
        assert_eq!(palette[2].color, white);
        assert!(luminance(palette[0].color) < luminance(palette[2].color));
    }

    #[test]
    fn gradient_is_monotonic_across_many_bins() {
        let names: Vec<String> = (0..8).map(|i| format!("bin{i}")).collect();
        let palette = assign(
            &names,
            &BTreeMap::new(),
            Color::rgb(0, 0, 0),
            Color::rgb(255, 255, 255),
        );
        for pair in palette.windows(2) {
            assert!(
                luminance(pair[0].color) < luminance(pair[1].color),
                "{} ({}) not darker than {} ({})",
                pair[0].label,
                pair[0].color,
                pair[1].label,
                pair[1].color
            );
        }
    }

    #[test]
    fn single_label_takes_end_color() {
        let start = Color::rgb(255, 255, 178);
        let end = Color::rgb(189, 0, 38);
        let palette = assign(&labels(&["1+"]), &BTreeMap::new(), start, end);
        assert_eq!(palette[0].color, end);
    }

    #[test]
    fn interpolation_roundtrips_endpoints_closely() {
        let start = Color::rgb(255, 255, 178);
        let end = Color::rgb(189, 0, 38);
        let near_start = interpolate(start, end, 1e-9);
        assert!(near_start.r.abs_diff(start.r) <= 1);
        assert!(near_start.g.abs_diff(start.g) <= 1);
        assert!(near_start.b.abs_diff(start.b) <= 1);
    }

    #[test]
    fn reconcile_drops_orphaned_labels() {
        let mut overrides = PaletteOverrides::new();
        overrides.set("1\u{2013}10", Color::rgb(1, 2, 3));
        overrides.set("21+", Color::rgb(4, 5, 6));

        let first = BinGeneration { step: 10, count: 3 };
        let current = labels(&["1\u{2013}10", "11\u{2013}20", "21+"]);
        assert!(overrides.reconcile(first, &current).is_empty());
        assert_eq!(overrides.len(), 2);

        let second = BinGeneration { step: 10, count: 2 };
        let changed = labels(&["1\u{2013}10", "11+"]);
        let dropped = overrides.reconcile(second, &changed);
        assert_eq!(dropped, vec!["21+".to_string()]);
        assert_eq!(overrides.get("1\u{2013}10"), Some(Color::rgb(1, 2, 3)));
        assert_eq!(overrides.generation(), Some(second));
    }

    #[test]
    fn reconcile_same_generation_is_noop() {
        let mut overrides = PaletteOverrides::new();
        let generation = BinGeneration { step: 5, count: 2 };
        overrides.reconcile(generation, &labels(&["1\u{2013}5", "6+"]));
        // an override set after reconciling is not judged again until the
        // bins change
        overrides.set("typo", Color::rgb(0, 0, 0));
        assert!(overrides.reconcile(generation, &labels(&["1\u{2013}5", "6+"])).is_empty());
        assert_eq!(overrides.len(), 1);
    }
}
