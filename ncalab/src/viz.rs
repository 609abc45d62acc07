//! Visualization: state snapshots, rollout GIFs and scalar curves.

use std::fs::File;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, Rgba, RgbaImage};
use plotters::prelude::*;

use crate::error::NcaError;
use crate::model::NcaModel;

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Render the image channels of one batch entry as an RGBA image.
///
/// One channel renders as grayscale, three as opaque RGB, four or more as
/// RGBA (extra channels are ignored).
pub fn state_to_rgba<B: Backend>(
    state: &Tensor<B, 4>,
    image_channels: usize,
    batch_index: usize,
) -> Result<RgbaImage, NcaError> {
    let [b, c, h, w] = state.dims();
    if batch_index >= b {
        return Err(NcaError::invalid_input(format!(
            "batch index {batch_index} out of range for batch of {b}"
        )));
    }
    let channels = image_channels.min(c);
    if channels == 0 {
        return Err(NcaError::invalid_input("state has no image channels"));
    }

    let values = state
        .clone()
        .slice([batch_index..batch_index + 1, 0..channels, 0..h, 0..w])
        .into_data()
        .convert::<f32>()
        .value;

    let plane = h * w;
    let mut img = RgbaImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            let index = y * w + x;
            let pixel = match channels {
                1 => {
                    let v = to_byte(values[index]);
                    Rgba([v, v, v, 255])
                }
                2 => {
                    let v = to_byte(values[index]);
                    Rgba([v, v, v, to_byte(values[plane + index])])
                }
                3 => Rgba([
                    to_byte(values[index]),
                    to_byte(values[plane + index]),
                    to_byte(values[2 * plane + index]),
                    255,
                ]),
                _ => Rgba([
                    to_byte(values[index]),
                    to_byte(values[plane + index]),
                    to_byte(values[2 * plane + index]),
                    to_byte(values[3 * plane + index]),
                ]),
            };
            img.put_pixel(x as u32, y as u32, pixel);
        }
    }
    Ok(img)
}

/// Save one batch entry's image channels as a PNG.
pub fn save_state_png<B: Backend>(
    state: &Tensor<B, 4>,
    image_channels: usize,
    path: &Path,
) -> Result<(), NcaError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    state_to_rgba(state, image_channels, 0)?.save(path)?;
    Ok(())
}

/// Roll a model out from a seed state and export snapshots as an animated
/// GIF. A frame is captured every `snapshot_every` steps plus the initial
/// and final states.
pub fn export_rollout_gif<B: Backend, M: NcaModel<B>>(
    model: &M,
    seed: Tensor<B, 4>,
    steps: usize,
    snapshot_every: usize,
    path: &Path,
) -> Result<PathBuf, NcaError> {
    if snapshot_every == 0 {
        return Err(NcaError::invalid_input("snapshot_every must be positive"));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let image_channels = model.layout().image;
    let file = File::create(path)?;
    let mut encoder = GifEncoder::new(file);
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| NcaError::Viz(format!("gif repeat: {e}")))?;

    let mut state = seed;
    let mut snapshot = |state: &Tensor<B, 4>, encoder: &mut GifEncoder<File>| {
        state_to_rgba(state, image_channels, 0).and_then(|img| {
            let delay = Delay::from_numer_denom_ms(40, 1);
            encoder
                .encode_frame(Frame::from_parts(img, 0, 0, delay))
                .map_err(|e| NcaError::Viz(format!("gif frame: {e}")))
        })
    };

    snapshot(&state, &mut encoder)?;
    for step in 1..=steps {
        // Detach per step so autodiff backends do not accumulate a graph
        // across the whole rollout.
        state = model.step(state).detach();
        if step % snapshot_every == 0 || step == steps {
            snapshot(&state, &mut encoder)?;
        }
    }
    Ok(path.to_path_buf())
}

/// Render a scalar series as a simple PNG line plot.
pub fn loss_curve(values: &[f64], path: &Path) -> Result<(), NcaError> {
    if values.is_empty() {
        return Err(NcaError::invalid_input("cannot plot an empty series"));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let pad = ((max - min).abs()).max(1e-6) * 0.05;

    let root = BitMapBackend::new(path, (800, 400)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| NcaError::Viz(e.to_string()))?;
    let mut chart = ChartBuilder::on(&root)
        .margin(16)
        .build_cartesian_2d(0f64..(values.len() as f64), (min - pad)..(max + pad))
        .map_err(|e| NcaError::Viz(e.to_string()))?;
    chart
        .draw_series(LineSeries::new(
            values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
            &RED,
        ))
        .map_err(|e| NcaError::Viz(e.to_string()))?;
    root.present().map_err(|e| NcaError::Viz(e.to_string()))?;
    Ok(())
}
