//! Semi-automatic processing of a directory of LSM acquisitions.
//!
//! Each accepted file is opened, split into its three channels and bound to
//! the session (acceptor, transfer, donor in stack order). Every channel is
//! then background corrected against the top-left `1/fraction` corner, that
//! corner is zeroed, and the channels are optionally blurred. The processor
//! then waits for [`BatchProcessor::next`]; thresholding, composition and
//! measurement stay with the caller.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, info_span, instrument, warn};

use crate::fret_pipeline::common::error::{FretError, Result};
use crate::fret_pipeline::config::PipelineConfig;
use crate::fret_pipeline::image::{ChannelFilter, GaussianBlur, LsmReader, Roi, StackReader};
use crate::fret_pipeline::session::{ChannelRole, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    SelectingDirectory,
    /// Index into [`BatchProcessor::files`] of the file currently prepared
    ProcessingFile(usize),
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchState::Idle => f.write_str("idle"),
            BatchState::SelectingDirectory => f.write_str("selecting directory"),
            BatchState::ProcessingFile(i) => write!(f, "processing file {}", i + 1),
        }
    }
}

/// A file that could not be prepared and was skipped.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Stack split order: acceptor, transfer, donor.
const SPLIT_ORDER: [ChannelRole; 3] = [ChannelRole::Acceptor, ChannelRole::Transfer, ChannelRole::Donor];

pub struct BatchProcessor<R: StackReader, F: ChannelFilter> {
    reader: R,
    filter: F,
    state: BatchState,
    files: Vec<PathBuf>,
    skipped: Vec<SkippedFile>,
    session: Session,
}

impl BatchProcessor<LsmReader, GaussianBlur> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_custom(LsmReader::new(), GaussianBlur, config)
    }
}

impl<R: StackReader, F: ChannelFilter> BatchProcessor<R, F> {
    pub fn with_custom(reader: R, filter: F, config: PipelineConfig) -> Self {
        Self {
            reader,
            filter,
            state: BatchState::Idle,
            files: Vec::new(),
            skipped: Vec::new(),
            session: Session::new(config),
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Directory entries of the current run, sorted by file name.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn current_file(&self) -> Option<&Path> {
        match self.state {
            BatchState::ProcessingFile(i) => self.files.get(i).map(PathBuf::as_path),
            _ => None,
        }
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Lists `dir` and prepares the first readable LSM file.
    ///
    /// Returns `Idle` right away when the directory holds no usable file.
    #[instrument(skip(self, dir), fields(dir = %dir.as_ref().display()))]
    pub fn start<P: AsRef<Path>>(&mut self, dir: P) -> Result<BatchState> {
        let dir = dir.as_ref();
        self.state = BatchState::SelectingDirectory;
        self.skipped.clear();
        self.session.reset_session();

        let mut files = match list_files(dir) {
            Ok(files) => files,
            Err(e) => {
                self.state = BatchState::Idle;
                return Err(e);
            }
        };
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        info!("{} file(s) in {}", files.len(), dir.display());
        self.files = files;

        Ok(self.advance_from(0))
    }

    /// Closes the current images and prepares the next LSM file.
    pub fn next(&mut self) -> BatchState {
        let BatchState::ProcessingFile(i) = self.state else {
            warn!("Next requested while {}", self.state);
            return self.state;
        };
        self.session.reset_session();
        self.advance_from(i + 1)
    }

    fn advance_from(&mut self, start: usize) -> BatchState {
        for i in start..self.files.len() {
            let path = self.files[i].clone();
            if !is_lsm(&path) {
                debug!("Skipping {}", path.display());
                continue;
            }

            match self.prepare_file(&path) {
                Ok(()) => {
                    info!("File {} of {}: {}", i + 1, self.files.len(), path.display());
                    self.state = BatchState::ProcessingFile(i);
                    return self.state;
                }
                Err(e) => {
                    error!("Skipping {}: {}", path.display(), e);
                    self.session.reset_session();
                    self.skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Batch processing finished");
        self.state = BatchState::Idle;
        self.state
    }

    #[instrument(skip(self, path), fields(file = %path.display()))]
    fn prepare_file(&mut self, path: &Path) -> Result<()> {
        let data = {
            let _span = info_span!("read_input_file").entered();
            fs::read(path).map_err(|e| FretError::InputReadError(format!("{}: {}", path.display(), e)))?
        };

        let channels = {
            let _span = info_span!("split_channels").entered();
            self.reader.read_channels(&data)?
        };
        if channels.len() < SPLIT_ORDER.len() {
            return Err(FretError::InvalidGeometry(format!(
                "expected 3 channels, found {}",
                channels.len()
            )));
        }
        if channels.len() > SPLIT_ORDER.len() {
            warn!("{} channels found, using the first 3", channels.len());
        }

        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for (role, image) in SPLIT_ORDER.into_iter().zip(channels) {
            self.session.bind(role, label.clone(), image)?;
        }

        let roi = self.background_roi()?;
        {
            let _span = info_span!("subtract_background").entered();
            self.session.set_roi(ChannelRole::Donor, Some(roi.clone()))?;
            self.session.copy_roi(ChannelRole::Donor)?;
            for role in ChannelRole::ALL {
                self.session.subtract_background(role)?;
                self.session.zero_fill(role, &roi)?;
            }
        }

        if let Some(radius) = self.session.config().blur_radius {
            let _span = info_span!("blur", radius).entered();
            for role in ChannelRole::ALL {
                self.session.blur_channel(role, &self.filter, radius)?;
            }
        }

        Ok(())
    }

    /// Top-left corner covering `1/background_fraction` of each side.
    fn background_roi(&self) -> Result<Roi> {
        let image = self.session.channel(ChannelRole::Donor)?.image();
        let fraction = self.session.config().background_fraction.max(1);
        let width = (image.width / fraction).max(1);
        let height = (image.height / fraction).max(1);
        Ok(Roi::rectangle(0, 0, width, height))
    }
}

/// Regular files directly inside `dir`.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_error = |e: std::io::Error| FretError::InputReadError(format!("{}: {}", dir.display(), e));
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn is_lsm(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lsm"))
}

#[cfg(test)]
mod tests;
