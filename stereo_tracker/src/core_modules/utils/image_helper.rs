pub mod image_helper {
    use image::{ImageEncoder, Rgba, RgbaImage};
    use std::path::Path;

    use crate::core_modules::coordinate::{Centroid, Resolution, Sample};

    const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const SILHOUETTE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const SLOT_COLORS: [Rgba<u8>; 4] = [
        Rgba([255, 0, 0, 255]),
        Rgba([0, 255, 0, 255]),
        Rgba([0, 128, 255, 255]),
        Rgba([255, 0, 193, 255]),
    ];
    const MARKER_HALF_SIZE: i64 = 3;

    /// Paints one sensor frame: valid samples in white, each centroid as a
    /// small cross in its slot's colour.
    pub fn render_overlay(resolution: Resolution, samples: &[Sample], centroids: &[Centroid]) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(resolution.width, resolution.height, BACKGROUND);

        for sample in samples.iter().filter(|s| s.valid) {
            if resolution.contains(&sample.coord) {
                canvas.put_pixel(sample.coord.x, sample.coord.y, SILHOUETTE);
            }
        }

        for (slot, centroid) in centroids.iter().enumerate() {
            let color = SLOT_COLORS[slot % SLOT_COLORS.len()];
            for offset in -MARKER_HALF_SIZE..=MARKER_HALF_SIZE {
                put_clipped(&mut canvas, centroid.x as i64 + offset, centroid.y as i64, color);
                put_clipped(&mut canvas, centroid.x as i64, centroid.y as i64 + offset, color);
            }
        }

        canvas
    }

    fn put_clipped(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }

    pub fn save(path: &Path, image: &RgbaImage) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgba8)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::coordinate::{Coordinate, Resolution, Sample};

    #[test]
    fn overlay_marks_silhouette_and_centroids() {
        let resolution = Resolution::new(40, 30);
        let samples = vec![Sample::valid(1, 1), Sample::invalid(2, 2), Sample::valid(100, 100)];
        let image = render_overlay(resolution, &samples, &[Coordinate::new(20, 15)]);

        assert_eq!(image.dimensions(), (40, 30));
        assert_eq!(image.get_pixel(1, 1).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(2, 2).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(20, 15).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(23, 15).0, [255, 0, 0, 255]);
    }

    #[test]
    fn markers_near_the_edge_are_clipped() {
        let resolution = Resolution::new(10, 10);
        let image = render_overlay(resolution, &[], &[Coordinate::new(0, 9), Coordinate::new(9, 0)]);
        assert_eq!(image.get_pixel(0, 9).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(9, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn save_overlay_file() {
        let image = render_overlay(Resolution::new(64, 48), &[Sample::valid(5, 5)], &[Coordinate::new(32, 24)]);
        let path = std::env::temp_dir().join("stereo_tracker_overlay_test.png");

        save(&path, &image).expect("Error Saving File.");
        assert!(path.exists());
        let _ = std::fs::remove_file(path);
    }
}
