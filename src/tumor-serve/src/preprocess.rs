//! Turns a decoded bitmap into the network's input tensor.
//!
//! The pipeline is fixed: stretch to 224x224 (no aspect-ratio
//! preservation), scale to `[0, 1]`, normalize each RGB channel with the
//! ImageNet statistics, and add a batch dimension of one.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;

use crate::timer::Timer;

/// Side length of the square network input.
pub const INPUT_SIZE: u32 = 224;

/// Per-channel mean, red/green/blue.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation, red/green/blue.
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Memory order of the input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Layout {
    /// Batch, height, width, channels (TensorFlow default)
    Nhwc,
    /// Batch, channels, height, width
    Nchw,
}

impl Layout {
    /// Tensor dimensions for a single `size`x`size` RGB image.
    pub fn dims(self, size: u32) -> [u64; 4] {
        let size = u64::from(size);
        match self {
            Layout::Nhwc => [1, size, size, 3],
            Layout::Nchw => [1, 3, size, size],
        }
    }
}

/// A batch-of-one float tensor ready to be fed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    dims: [u64; 4],
    layout: Layout,
}

impl ImageTensor {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn dims(&self) -> &[u64; 4] {
        &self.dims
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }
}

pub fn preprocess(image: &RgbImage, layout: Layout) -> ImageTensor {
    let t = Timer::start("Resizing image");

    let resized = imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut data = vec![0f32; plane * 3];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * INPUT_SIZE + x) as usize;

        for (c, &value) in pixel.0.iter().enumerate() {
            let index = match layout {
                Layout::Nhwc => offset * 3 + c,
                Layout::Nchw => c * plane + offset,
            };
            data[index] = normalize(value, c);
        }
    }

    t.stop();

    ImageTensor {
        data,
        dims: layout.dims(INPUT_SIZE),
        layout,
    }
}

fn normalize(value: u8, channel: usize) -> f32 {
    (f32::from(value) / 255.0 - MEAN[channel]) / STD[channel]
}
