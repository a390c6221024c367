use image::RgbaImage;

use crate::{
    error::{GalleryError, Result},
    resources::{AssetSource, LoadProgress},
};

pub async fn load_picture(
    source: &AssetSource,
    url: &str,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<RgbaImage> {
    let data = source.load_binary(url, progress).await?;
    decode_picture(url, &data)
}

/// Decode any format the `image` crate was built with, guessing it from the bytes.
pub fn decode_picture(url: &str, data: &[u8]) -> Result<RgbaImage> {
    image::load_from_memory(data)
        .map(|img| img.to_rgba8())
        .map_err(|e| GalleryError::parse(url, e))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn png_bytes_decode_to_rgba() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let picture = decode_picture("red.png", &png).unwrap();
        assert_eq!(picture.dimensions(), (3, 2));
        assert_eq!(picture.get_pixel(2, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            decode_picture("broken.jpg", b"not an image"),
            Err(GalleryError::Parse { .. })
        ));
    }
}
