use image::imageops::FilterType;
use ndarray::Array4;
use thiserror::Error;

/// Input resolution the classifier was trained on.
pub const INPUT_SIZE: u32 = 224;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("unsupported image format, expected JPEG, PNG, WEBP or GIF")]
    UnsupportedFormat,
    #[error("image decoding failed: {0}")]
    CorruptImage(String),
}

/// Fixed-shape `(1, 224, 224, 3)` float tensor in the MobileNetV2 input
/// domain `[-1, 1]`. Ephemeral; owned by the inference call that built it.
#[derive(Debug)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    pub fn data(&self) -> &Array4<f32> {
        &self.0
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }
}

/// Decodes raw upload bytes into the classifier's exact input contract:
/// 3-channel color, 224x224 with a deterministic triangle filter, pixel
/// intensities scaled to `[-1, 1]`, leading singleton batch axis.
pub fn decode_and_preprocess(bytes: &[u8]) -> Result<ImageTensor, PreprocessError> {
    let format = image::guess_format(bytes).map_err(|_| PreprocessError::UnsupportedFormat)?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| PreprocessError::CorruptImage(e.to_string()))?;

    let resized = decoded
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, y as usize, x as usize, channel]] =
                pixel[channel] as f32 / 127.5 - 1.0;
        }
    }

    Ok(ImageTensor(tensor))
}
