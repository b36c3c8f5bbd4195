//! Post-process skin finish
//!
//! Colour-only effects blended inside each treated zone's ellipse. Pixel
//! positions never move, and pixels outside every treated ellipse are left
//! untouched.

use std::borrow::Cow;

use image::{imageops, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, instrument};

use crate::domain::{Ellipse, ProcedureSet, SkinProfile, ZoneTable};

/// Feathering starts at this fraction of the ellipse radius
const FEATHER_START: f64 = 0.7;

/// Blend weight: 1 in the core, smooth fade to 0 at the ellipse boundary
fn mask_weight(ellipse: &Ellipse, x: f64, y: f64) -> f64 {
    let d = ellipse.normalized_distance(x, y);
    if d >= 1.0 {
        return 0.0;
    }
    if d <= FEATHER_START {
        return 1.0;
    }
    let t = (d - FEATHER_START) / (1.0 - FEATHER_START);
    1.0 - t * t * (3.0 - 2.0 * t)
}

/// Apply the skin profile of every active procedure to its zone.
///
/// Returns the input borrowed when no active procedure carries a skin
/// profile.
#[instrument(skip_all, fields(procedures = procedures.len()))]
pub fn apply_skin_effects<'a>(
    image: &'a RgbaImage,
    procedures: &ProcedureSet,
    zones: &ZoneTable,
) -> Cow<'a, RgbaImage> {
    let (width, height) = image.dimensions();
    let mut output: Option<RgbaImage> = None;

    for (zone_id, procedure) in procedures.active() {
        let Some(profile) = procedure.kind.skin_profile() else {
            continue;
        };
        let Some(zone) = zones.get(zone_id) else {
            debug!(zone_id = %zone_id, "Skin effect for unknown zone, skipping");
            continue;
        };

        let ellipse = zone.ellipse(width, height);
        let amount = procedure.intensity.fraction();
        let target = output.get_or_insert_with(|| image.clone());
        apply_zone(target, &ellipse, &profile, amount);

        debug!(
            zone_id = %zone_id,
            procedure = %procedure.kind,
            amount = amount,
            "Applied skin effect"
        );
    }

    match output {
        Some(img) => Cow::Owned(img),
        None => Cow::Borrowed(image),
    }
}

fn apply_zone(image: &mut RgbaImage, ellipse: &Ellipse, profile: &SkinProfile, amount: f64) {
    let (width, height) = image.dimensions();
    let sigma = profile.blur_sigma * amount as f32;
    let smoothing = profile.smoothing as f64 * amount;
    let brightness = profile.brightness as f64 * amount;

    // Ellipse bounds clipped to the image, padded so the blur sees context
    let bounds = ellipse.bounding_box(1.0);
    let pad = (sigma * 3.0).ceil() as f64;
    let x0 = (bounds.min_x - pad).floor().max(0.0) as u32;
    let y0 = (bounds.min_y - pad).floor().max(0.0) as u32;
    let x1 = ((bounds.max_x + pad).ceil() as i64).clamp(0, width as i64) as u32;
    let y1 = ((bounds.max_y + pad).ceil() as i64).clamp(0, height as i64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let blurred = if sigma > 0.0 && smoothing > 0.0 {
        let patch = imageops::crop_imm(&*image, x0, y0, x1 - x0, y1 - y0).to_image();
        Some(gaussian_blur_f32(&patch, sigma))
    } else {
        None
    };

    for y in y0..y1 {
        for x in x0..x1 {
            let weight = mask_weight(ellipse, x as f64, y as f64);
            if weight <= 0.0 {
                continue;
            }
            let original = *image.get_pixel(x, y);
            let mut result = [0u8; 4];
            for i in 0..3 {
                let mut value = original.0[i] as f64;
                if let Some(blurred) = blurred.as_ref() {
                    let soft = blurred.get_pixel(x - x0, y - y0).0[i] as f64;
                    value += (soft - value) * smoothing * weight;
                }
                value += brightness * weight;
                result[i] = value.round().clamp(0.0, 255.0) as u8;
            }
            result[3] = original.0[3];
            image.put_pixel(x, y, Rgba(result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Procedure, ProcedureType};

    fn noisy(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = ((x * 37 + y * 91) % 200) as u8 + 20;
            Rgba([v, v / 2, 255 - v, 255])
        })
    }

    fn outside_all(zones: &ZoneTable, procedures: &ProcedureSet, w: u32, h: u32, x: u32, y: u32) -> bool {
        procedures.iter().all(|(id, _)| {
            zones
                .get(id)
                .map(|z| !z.ellipse(w, h).contains(x as f64, y as f64))
                .unwrap_or(true)
        })
    }

    #[test]
    fn test_no_skin_procedures_borrows() {
        let image = noisy(64, 64);
        let zones = ZoneTable::builtin();
        let mut procedures = ProcedureSet::new();
        procedures.set("jawline_left", Procedure::new(ProcedureType::Contouring, 80.0));
        procedures.set("cheek_left", Procedure::new(ProcedureType::Skinbooster, 0.0));

        let result = apply_skin_effects(&image, &procedures, &zones);
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_effects_stay_inside_ellipse() {
        let (w, h) = (128, 128);
        let image = noisy(w, h);
        let zones = ZoneTable::builtin();
        let mut procedures = ProcedureSet::new();
        procedures.set("forehead", Procedure::new(ProcedureType::Skinbooster, 100.0));
        procedures.set("cheek_right", Procedure::new(ProcedureType::Botox, 60.0));

        let result = apply_skin_effects(&image, &procedures, &zones);
        let mut changed = 0;
        for (x, y, pixel) in result.enumerate_pixels() {
            if outside_all(&zones, &procedures, w, h, x, y) {
                assert_eq!(pixel, image.get_pixel(x, y), "pixel ({}, {}) changed", x, y);
            } else if pixel != image.get_pixel(x, y) {
                changed += 1;
            }
            assert_eq!(pixel.0[3], image.get_pixel(x, y).0[3]);
        }
        assert!(changed > 0);
    }

    #[test]
    fn test_brightening_raises_luma_at_center() {
        let (w, h) = (100, 100);
        let image = RgbaImage::from_pixel(w, h, Rgba([100, 100, 100, 255]));
        let zones = ZoneTable::builtin();
        let zone = zones.get("forehead").unwrap();
        let center = zone.ellipse(w, h).center;

        let mut procedures = ProcedureSet::new();
        procedures.set("forehead", Procedure::new(ProcedureType::Skinbooster, 50.0));
        let half = apply_skin_effects(&image, &procedures, &zones).into_owned();
        procedures.set("forehead", Procedure::new(ProcedureType::Skinbooster, 100.0));
        let full = apply_skin_effects(&image, &procedures, &zones).into_owned();

        let (cx, cy) = (center.x as u32, center.y as u32);
        let half_v = half.get_pixel(cx, cy).0[0];
        let full_v = full.get_pixel(cx, cy).0[0];
        assert!(half_v > 100);
        assert!(full_v > half_v);
    }

    #[test]
    fn test_mask_weight_profile() {
        let ellipse = Ellipse {
            center: crate::domain::Point::new(50.0, 50.0),
            rx: 10.0,
            ry: 20.0,
        };
        assert_eq!(mask_weight(&ellipse, 50.0, 50.0), 1.0);
        assert_eq!(mask_weight(&ellipse, 60.0, 50.0), 0.0);
        let mid = mask_weight(&ellipse, 58.5, 50.0);
        assert!(mid > 0.0 && mid < 1.0);
    }
}
