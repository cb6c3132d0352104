use std::collections::BTreeSet;

use crate::settings::ColorMap;

pub const FALLBACK_COLOR: &str = "#ff2b2b";
pub const EXHAUSTED_COLOR: &str = "#000000";
const PICK_ATTEMPTS: usize = 20;

/// `hsl(h, s%, l%)` to `#rrggbb`, channels rounded the way a canvas
/// normalizes colour strings.
pub fn hsl_to_hex(hue: f64, saturation: f64, lightness: f64) -> String {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = saturation.clamp(0.0, 1.0);
    let l = lightness.clamp(0.0, 1.0);
    let chroma = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = l - chroma / 2.0;
    let channel = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

/// Random saturated colour not yet used in `existing`. `random` yields
/// values in `[0, 1)`.
pub fn pick_unique_color(existing: &ColorMap, mut random: impl FnMut() -> f64) -> String {
    let used: BTreeSet<&str> = existing.values().map(String::as_str).collect();
    for _ in 0..PICK_ATTEMPTS {
        let hue = (random() * 360.0).floor();
        let color = hsl_to_hex(hue, 0.7, 0.5);
        if !used.contains(color.as_str()) {
            return color;
        }
    }
    EXHAUSTED_COLOR.to_string()
}

/// Give every class in `classes` a colour; returns whether anything was added.
pub fn assign_missing<'a>(
    map: &mut ColorMap,
    classes: impl IntoIterator<Item = &'a str>,
    mut random: impl FnMut() -> f64,
) -> bool {
    let mut changed = false;
    for class_name in classes {
        if class_name.is_empty() || map.contains_key(class_name) {
            continue;
        }
        let color = pick_unique_color(map, &mut random);
        map.insert(class_name.to_string(), color);
        changed = true;
    }
    changed
}

pub fn color_for<'a>(map: &'a ColorMap, class_name: &str) -> &'a str {
    map.get(class_name).map_or(FALLBACK_COLOR, String::as_str)
}

/// `#rrggbb` with the given alpha as an `rgba()` string.
pub fn with_alpha(hex: &str, alpha: f64) -> String {
    let parse = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|part| u8::from_str_radix(part, 16).ok())
            .unwrap_or(0)
    };
    if hex.len() != 7 || !hex.starts_with('#') {
        return format!("rgba(255, 43, 43, {alpha})");
    }
    format!(
        "rgba({}, {}, {}, {alpha})",
        parse(1..3),
        parse(3..5),
        parse(5..7)
    )
}
