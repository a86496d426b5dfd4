use std::path::PathBuf;

use crate::error::RsResult;

/// ffmpeg input pattern matching [`frame_file_name`].
pub const FRAME_PATTERN: &str = "%05d.jpg";

pub fn frame_file_name(index: usize) -> String {
    format!("{:05}.jpg", index)
}

/// Gapless numbered frames in one directory. Only committed frames consume an index.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    dir: PathBuf,
    count: usize,
}

impl FrameSequence {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, count: 0 }
    }

    /// Empties (or creates) `dir` and starts a sequence in it.
    pub async fn reset(dir: PathBuf) -> RsResult<Self> {
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self::new(dir))
    }

    /// Input pattern covering every committed frame.
    pub fn pattern(&self) -> PathBuf {
        self.dir.join(FRAME_PATTERN)
    }

    /// Where the next frame has to be written before [`FrameSequence::commit`].
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(frame_file_name(self.count))
    }

    /// Keeps the frame at [`FrameSequence::next_path`] and returns its index.
    pub fn commit(&mut self) -> usize {
        self.count += 1;
        self.count - 1
    }

    /// Drops whatever a failed write left at the next index.
    pub async fn discard_pending(&self) -> RsResult<()> {
        let path = self.next_path();
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
