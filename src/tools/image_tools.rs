use std::{fs::File, io::BufWriter, path::Path};

use image::{codecs::jpeg::JpegEncoder, RgbImage};

use crate::error::RsResult;

pub mod reference;
pub mod alignment;

pub const FRAME_JPEG_QUALITY: u8 = 90;

pub fn open_rgb(path: &Path) -> RsResult<RgbImage> {
    let image = image::open(path)?;
    Ok(image.into_rgb8())
}

/// Reads the pixel size from the header without decoding the whole file.
pub fn read_dimensions(path: &Path) -> RsResult<(u32, u32)> {
    Ok(image::image_dimensions(path)?)
}

pub fn save_jpeg(image: &RgbImage, path: &Path) -> RsResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, FRAME_JPEG_QUALITY);
    image.write_with_encoder(encoder)?;
    Ok(())
}
