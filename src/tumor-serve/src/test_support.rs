use std::io::{Cursor, Write};

use tempfile::{NamedTempFile, TempDir};

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

use crate::error::Result;
use crate::model::InferenceBackend;
use crate::preprocess::{ImageTensor, Layout};

/// Backend returning the same logits for every input.
pub struct FixedScores {
    scores: Vec<f32>,
    layout: Layout,
}

impl FixedScores {
    pub fn new(scores: Vec<f32>) -> Self {
        FixedScores {
            scores,
            layout: Layout::Nhwc,
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }
}

impl InferenceBackend for FixedScores {
    fn layout(&self) -> Layout {
        self.layout
    }

    fn infer(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        assert_eq!(input.layout(), self.layout);
        assert_eq!(input.dims(), &self.layout.dims(224));
        Ok(self.scores.clone())
    }
}

pub fn encode_png(image: DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

pub fn red_png() -> Vec<u8> {
    encode_png(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        64,
        48,
        Rgb([200, 16, 16]),
    )))
}

/// Temporary directory, removed when the guard drops.
pub fn scratch_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// Temporary file holding `contents`, removed when the guard drops.
pub fn scratch_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
