use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

/// Pull based frame supplier. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    #[inline]
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }
}

/// Adapts any iterator of decoded frames.
pub struct IterSource<I> {
    inner: I,
}

impl<I: Iterator<Item = RgbImage>> IterSource<I> {
    pub fn new<T: IntoIterator<IntoIter = I, Item = RgbImage>>(frames: T) -> Self {
        Self {
            inner: frames.into_iter(),
        }
    }
}

impl<I: Iterator<Item = RgbImage>> FrameSource for IterSource<I> {
    #[inline]
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.inner.next())
    }
}

/// Frames stored as numbered images in one directory, read in file name order.
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    cursor: usize,
}

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

impl ImageDirSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);

            if path.is_file() && is_image {
                files.push(path);
            }
        }

        files.sort();
        info!(dir = %dir.as_ref().display(), frames = files.len(), "image sequence opened");

        Ok(Self { files, cursor: 0 })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let path = match self.files.get(self.cursor) {
            Some(path) => path,
            None => return Ok(None),
        };

        debug!(path = %path.display(), "reading frame");
        let frame = image::open(path)?.to_rgb8();
        self.cursor += 1;

        Ok(Some(frame))
    }
}
