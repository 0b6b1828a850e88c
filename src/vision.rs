use crate::types::{BoundingBox, Result};
use chrono::Local;
use image::{imageops, DynamicImage, GenericImageView, GrayImage};
use imageproc::contrast::adaptive_threshold;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Crops `bbox` out of `image`, clamped to its bounds. Empty regions give
/// `None`.
pub fn crop(image: &DynamicImage, bbox: &BoundingBox) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();
    let clamp = |v: f32, max: u32| v.max(0.0).min(max as f32) as u32;
    let x1 = clamp(bbox.x1, width);
    let y1 = clamp(bbox.y1, height);
    let x2 = clamp(bbox.x2, width);
    let y2 = clamp(bbox.y2, height);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(image.crop_imm(x1, y1, x2 - x1, y2 - y1))
}

/// Grayscale, blur, then inverted adaptive threshold: dark glyphs come out
/// white on black for the OCR engine.
pub fn preprocess_plate(plate: &DynamicImage) -> GrayImage {
    let gray = plate.to_luma8();
    let blurred = imageops::blur(&gray, 1.1);
    let mut binary = adaptive_threshold(&blurred, 5);
    imageops::invert(&mut binary);
    binary
}

/// Audit copies of every vehicle and plate crop. Never read back.
pub struct CropArchive {
    car_dir: PathBuf,
    plate_dir: PathBuf,
}

impl CropArchive {
    pub fn create(car_dir: &Path, plate_dir: &Path) -> Result<CropArchive> {
        fs::create_dir_all(car_dir)?;
        fs::create_dir_all(plate_dir)?;
        Ok(CropArchive {
            car_dir: car_dir.to_path_buf(),
            plate_dir: plate_dir.to_path_buf(),
        })
    }

    pub fn save_car(&self, image: &DynamicImage) -> Option<PathBuf> {
        save(&self.car_dir, "car", image)
    }

    pub fn save_plate(&self, image: &DynamicImage) -> Option<PathBuf> {
        let path = save(&self.plate_dir, "plate", image);
        if let Some(ref p) = path {
            info!("License plate saved: {:?}", p);
        }
        path
    }
}

fn save(dir: &Path, prefix: &str, image: &DynamicImage) -> Option<PathBuf> {
    let name = format!(
        "{}_{}_{}.jpg",
        prefix,
        Local::now().format("%Y%m%d_%H%M%S"),
        &Uuid::new_v4().to_simple().to_string()[..8]
    );
    let path = dir.join(name);
    match DynamicImage::ImageRgb8(image.to_rgb8()).save(&path) {
        Ok(_) => Some(path),
        Err(e) => {
            warn!("Error saving image to {:?}: {:?}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn boxed(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn crop_clamps_to_image() {
        let image = DynamicImage::new_rgb8(100, 50);
        let c = crop(&image, &boxed(-10.0, 10.0, 40.0, 80.0)).unwrap();
        assert_eq!(c.dimensions(), (40, 40));
        let c = crop(&image, &boxed(90.5, 0.0, 150.0, 50.0)).unwrap();
        assert_eq!(c.dimensions(), (10, 50));
    }

    #[test]
    fn empty_crop_is_none() {
        let image = DynamicImage::new_rgb8(100, 50);
        assert!(crop(&image, &boxed(20.0, 20.0, 20.0, 40.0)).is_none());
        assert!(crop(&image, &boxed(120.0, 0.0, 150.0, 10.0)).is_none());
        assert!(crop(&image, &boxed(40.0, 30.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn preprocess_turns_dark_text_white() {
        // Light plate with a dark vertical stroke in the middle.
        let plate = RgbImage::from_fn(60, 20, |x, _| {
            if (28..32).contains(&x) {
                Rgb([10, 10, 10])
            } else {
                Rgb([230, 230, 230])
            }
        });
        let binary = preprocess_plate(&DynamicImage::ImageRgb8(plate));
        assert_eq!(binary.dimensions(), (60, 20));
        assert_eq!(*binary.get_pixel(30, 10), Luma([255]));
        assert_eq!(*binary.get_pixel(25, 10), Luma([0]));
    }

    #[test]
    fn archive_writes_timestamped_jpegs() {
        let dir = tempfile::tempdir().unwrap();
        let archive =
            CropArchive::create(&dir.path().join("cars"), &dir.path().join("plates")).unwrap();
        let image = DynamicImage::new_rgb8(8, 8);
        let car = archive.save_car(&image).unwrap();
        let plate = archive.save_plate(&image).unwrap();
        let car_again = archive.save_car(&image).unwrap();
        assert!(car.starts_with(dir.path().join("cars")));
        assert!(plate.starts_with(dir.path().join("plates")));
        assert_ne!(car, car_again);
        let name = car.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("car_") && name.ends_with(".jpg"));
        assert!(car.exists() && plate.exists());
    }
}
