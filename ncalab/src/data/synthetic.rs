//! Procedural datasets for self-contained tasks and tests.
//!
//! Every generator returns plain [`GridSample`]s, so tasks run without any
//! downloaded data. Loaders for public datasets stay out of scope; user
//! images enter through the CLI instead.

use burn::data::dataset::InMemDataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::dataset::GridSample;
use crate::error::NcaError;

fn disc(cy: f64, cx: f64, radius: f64, y: usize, x: usize) -> bool {
    let dy = y as f64 - cy;
    let dx = x as f64 - cx;
    (dy * dy + dx * dx).sqrt() <= radius
}

/// Procedural RGBA emoji-like target: a warm disc with two dark eyes.
/// Returns a `[4, height, width]` channels-first buffer in `[0, 1]`.
pub fn emoji_target(height: usize, width: usize) -> Vec<f32> {
    let (cy, cx) = (height as f64 / 2.0, width as f64 / 2.0);
    let radius = 0.38 * height.min(width) as f64;
    let eye_r = radius * 0.18;
    let eye_dy = -radius * 0.3;
    let eye_dx = radius * 0.4;

    let mut buffer = vec![0.0f32; 4 * height * width];
    let plane = height * width;
    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            if !disc(cy, cx, radius, y, x) {
                continue;
            }
            let eye = disc(cy + eye_dy, cx - eye_dx, eye_r, y, x)
                || disc(cy + eye_dy, cx + eye_dx, eye_r, y, x);
            let (r, g, b) = if eye { (0.1, 0.1, 0.1) } else { (1.0, 0.8, 0.2) };
            buffer[index] = r;
            buffer[plane + index] = g;
            buffer[2 * plane + index] = b;
            buffer[3 * plane + index] = 1.0;
        }
    }
    buffer
}

/// Seed image channels for a growing run: zeros except a single alive
/// (alpha = 1) center cell. Returns a `[4, height, width]` buffer.
pub fn growing_seed_image(height: usize, width: usize) -> Vec<f32> {
    let mut buffer = vec![0.0f32; 4 * height * width];
    let center = (height / 2) * width + width / 2;
    buffer[3 * height * width + center] = 1.0;
    buffer
}

/// Dataset for the growing task: `count` copies of (seed, target). The
/// target defaults to the procedural emoji; pass a custom RGBA buffer to
/// grow a user image instead.
pub fn growing_dataset(
    height: usize,
    width: usize,
    count: usize,
    target: Option<Vec<f32>>,
) -> Result<InMemDataset<GridSample>, NcaError> {
    let target = target.unwrap_or_else(|| emoji_target(height, width));
    let seed = growing_seed_image(height, width);
    let samples = (0..count)
        .map(|_| GridSample::new(seed.clone(), target.clone(), 4, 4, height, width))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(InMemDataset::new(samples))
}

/// Random bright-blob-on-noise images with binary masks.
pub fn segmentation_dataset(
    count: usize,
    height: usize,
    width: usize,
    seed: u64,
) -> Result<InMemDataset<GridSample>, NcaError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let plane = height * width;
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let cy = rng.gen_range(0.25..0.75) * height as f64;
        let cx = rng.gen_range(0.25..0.75) * width as f64;
        let radius = rng.gen_range(0.12..0.3) * height.min(width) as f64;
        let tint: [f32; 3] = [
            rng.gen_range(0.7..1.0),
            rng.gen_range(0.7..1.0),
            rng.gen_range(0.7..1.0),
        ];

        let mut image = vec![0.0f32; 3 * plane];
        let mut mask = vec![0.0f32; plane];
        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                if disc(cy, cx, radius, y, x) {
                    for (channel, value) in tint.iter().enumerate() {
                        image[channel * plane + index] = *value;
                    }
                    mask[index] = 1.0;
                } else {
                    for channel in 0..3 {
                        image[channel * plane + index] = rng.gen_range(0.0..0.3);
                    }
                }
            }
        }
        samples.push(GridSample::new(image, mask, 3, 1, height, width)?);
    }
    Ok(InMemDataset::new(samples))
}

/// Random dome-shaped depth maps over blob images: depth falls off with
/// distance from the blob center.
pub fn depth_dataset(
    count: usize,
    height: usize,
    width: usize,
    seed: u64,
) -> Result<InMemDataset<GridSample>, NcaError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let plane = height * width;
    let span = height.min(width) as f64;
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let cy = rng.gen_range(0.3..0.7) * height as f64;
        let cx = rng.gen_range(0.3..0.7) * width as f64;
        let radius = rng.gen_range(0.2..0.4) * span;

        let mut image = vec![0.0f32; 3 * plane];
        let mut depth = vec![0.0f32; plane];
        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                let dy = y as f64 - cy;
                let dx = x as f64 - cx;
                let distance = (dy * dy + dx * dx).sqrt();
                let dome = (1.0 - distance / radius).max(0.0);
                depth[index] = dome as f32;
                image[index] = dome as f32;
                image[plane + index] = (dome * dome) as f32;
                image[2 * plane + index] = if dome > 0.0 { 0.8 } else { 0.1 };
            }
        }
        samples.push(GridSample::new(image, depth, 3, 1, height, width)?);
    }
    Ok(InMemDataset::new(samples))
}

/// Grayscale glyphs (square, cross, disc, ring, stripes) with dense label
/// maps: every cell of a sample carries the sample's class index.
pub fn classification_dataset(
    count: usize,
    height: usize,
    width: usize,
    classes: usize,
    seed: u64,
) -> Result<InMemDataset<GridSample>, NcaError> {
    if classes < 2 || classes > 5 {
        return Err(NcaError::dataset(
            "glyph dataset supports between 2 and 5 classes",
        ));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let plane = height * width;
    let (cy, cx) = (height as f64 / 2.0, width as f64 / 2.0);
    let radius = 0.35 * height.min(width) as f64;

    let mut samples = Vec::with_capacity(count);
    for sample_index in 0..count {
        let class = sample_index % classes;
        let jitter = rng.gen_range(-1.0..1.0);
        let (gy, gx) = (cy + jitter, cx + jitter);

        let mut image = vec![0.0f32; plane];
        for y in 0..height {
            for x in 0..width {
                let index = y * width + x;
                let dy = (y as f64 - gy).abs();
                let dx = (x as f64 - gx).abs();
                let on = match class {
                    0 => dy <= radius && dx <= radius,
                    1 => dy <= radius * 0.3 || dx <= radius * 0.3,
                    2 => disc(gy, gx, radius, y, x),
                    3 => {
                        let distance = (dy * dy + dx * dx).sqrt();
                        distance <= radius && distance >= radius * 0.55
                    }
                    _ => (y + x) % 4 < 2 && dy.max(dx) <= radius,
                };
                if on {
                    image[index] = 1.0;
                }
            }
        }
        let target = vec![class as f32; plane];
        samples.push(GridSample::new(image, target, 1, 1, height, width)?);
    }
    Ok(InMemDataset::new(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;

    #[test]
    fn test_emoji_target_has_body_and_transparent_corners() {
        let target = emoji_target(16, 16);
        let plane = 16 * 16;
        // Center is opaque, corner transparent.
        assert_eq!(target[3 * plane + 8 * 16 + 8], 1.0);
        assert_eq!(target[3 * plane], 0.0);
    }

    #[test]
    fn test_growing_dataset_shapes() {
        let dataset = growing_dataset(16, 16, 8, None).unwrap();
        assert_eq!(dataset.len(), 8);
        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.channels, 4);
        assert_eq!(sample.target_channels, 4);
        // Exactly one alive seed cell.
        let alpha_sum: f32 = sample.image[3 * 256..].iter().sum();
        assert_eq!(alpha_sum, 1.0);
    }

    #[test]
    fn test_segmentation_dataset_masks_are_binary() {
        let dataset = segmentation_dataset(4, 16, 16, 0).unwrap();
        let sample = dataset.get(2).unwrap();
        assert!(sample.target.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(sample.target.iter().any(|&v| v == 1.0));
    }

    #[test]
    fn test_classification_dataset_cycles_classes() {
        let dataset = classification_dataset(6, 12, 12, 3, 0).unwrap();
        for index in 0..6 {
            let sample = dataset.get(index).unwrap();
            let expected = (index % 3) as f32;
            assert!(sample.target.iter().all(|&v| v == expected));
        }
        assert!(classification_dataset(4, 12, 12, 1, 0).is_err());
    }

    #[test]
    fn test_depth_dataset_in_unit_range() {
        let dataset = depth_dataset(2, 16, 16, 1).unwrap();
        let sample = dataset.get(0).unwrap();
        assert!(sample.target.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
