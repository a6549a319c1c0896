use std::path::PathBuf;

use chrono::Utc;

use crate::error::CaptureError;
use crate::frame::source::Pacer;
use crate::frame::{Frame, FrameSource};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Replays the images of a directory as a video stream, sorted by file name.
pub struct ImageDirSource {
    dir: PathBuf,
    name: String,
    looped: bool,
    pacer: Pacer,
    files: Vec<PathBuf>,
    cursor: usize,
    next_seq: u64,
}

impl ImageDirSource {
    pub fn new(dir: PathBuf, fps: Option<f32>, looped: bool) -> Self {
        Self {
            name: format!("images:{}", dir.display()),
            dir,
            looped,
            pacer: Pacer::new(fps),
            files: Vec::new(),
            cursor: 0,
            next_seq: 0,
        }
    }
}

impl FrameSource for ImageDirSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), CaptureError> {
        if !self.dir.is_dir() {
            return Err(CaptureError::Unavailable(self.name.clone()));
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(CaptureError::Unavailable(format!("{} (no images)", self.name)));
        }
        log::info!("{}: opened with {} images", self.name, files.len());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.files.is_empty() {
            return Err(CaptureError::Unavailable(self.name.clone()));
        }
        if self.cursor >= self.files.len() {
            if !self.looped {
                return Ok(None);
            }
            self.cursor = 0;
        }
        self.pacer.wait();

        let path = &self.files[self.cursor];
        self.cursor += 1;
        let image = image::open(path)
            .map_err(|err| CaptureError::Decode {
                path: path.clone(),
                reason: err.to_string(),
            })?
            .to_rgb8();

        let frame = Frame::new(self.next_seq, Utc::now(), image);
        self.next_seq += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if !self.files.is_empty() {
            log::info!("{}: closed after {} frames", self.name, self.next_seq);
            self.files.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_reads_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, w) in [("b.png", 6), ("a.png", 4), ("notes.txt", 0)] {
            let path = dir.path().join(name);
            if w == 0 {
                std::fs::write(&path, "skip me").unwrap();
            } else {
                RgbImage::from_pixel(w, 2, Rgb([1, 2, 3])).save(&path).unwrap();
            }
        }

        let mut source = ImageDirSource::new(dir.path().to_path_buf(), None, false);
        source.open().unwrap();
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!((first.seq(), first.width()), (0, 4));
        assert_eq!((second.seq(), second.width()), (1, 6));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let mut source = ImageDirSource::new(PathBuf::from("/nonexistent/frames"), None, false);
        assert!(matches!(source.open(), Err(CaptureError::Unavailable(_))));
    }
}
