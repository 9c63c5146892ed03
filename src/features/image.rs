use ::image::{imageops::FilterType, load_from_memory};
use ndarray::Array4;

use crate::{features::ExtractionError, model::IMAGE_SIZE};

/// ImageNet channel means in BGR order, as subtracted by the ResNet50
/// ("caffe") preprocessing the classifier was trained with.
pub const BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// Decodes an image upload into a `(1, 224, 224, 3)` BGR, mean-centred tensor.
///
/// Resizing uses nearest-neighbour sampling to match how the training images
/// were loaded.
pub fn extract_image_features(bytes: &[u8]) -> Result<Array4<f32>, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Decode("image upload is empty".into()));
    }
    let decoded = load_from_memory(bytes).map_err(|e| ExtractionError::Decode(e.to_string()))?;
    let rgb = decoded
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::Nearest)
        .to_rgb8();

    let side = IMAGE_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        tensor[[0, y, x, 0]] = f32::from(b) - BGR_MEAN[0];
        tensor[[0, y, x, 1]] = f32::from(g) - BGR_MEAN[1];
        tensor[[0, y, x, 2]] = f32::from(r) - BGR_MEAN[2];
    }
    Ok(tensor)
}
