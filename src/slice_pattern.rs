//! Infers the file-name template and slice range of a directory of scans.

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Extensions probed by [`resolve_directory`], in order of preference
pub const KNOWN_EXTENSIONS: [&str; 2] = ["ang", "ctf"];

/// One slice file, either discovered on disk or generated from an
/// [`ImportRange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceFileDescriptor {
    pub index: u64,
    pub path: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub extension: String,
    pub digit_width: usize,
    pub exists: bool,
}

impl AsRef<Path> for SliceFileDescriptor {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// File-name template and inclusive slice range of a stack.
///
/// The default value is the "nothing found" state: every field zero or
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRange {
    pub start_index: u64,
    pub end_index: u64,
    pub prefix: String,
    pub suffix: String,
    pub extension: String,
    pub digit_width: usize,
    /// Number of matching files seen while scanning
    pub total_files: usize,
}

impl ImportRange {
    /// True when no template is known, i.e. scanning matched nothing
    pub fn is_empty(&self) -> bool {
        self.extension.is_empty()
    }

    /// Number of slices covered by `start_index..=end_index`, saturating at
    /// `u64::MAX` for the full index range
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        match self.end_index.checked_sub(self.start_index) {
            Some(span) => span.saturating_add(1),
            None => 0,
        }
    }
}

/// A base name split around its last run of decimal digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitRun<'a> {
    pub prefix: &'a str,
    pub digits: &'a str,
    pub suffix: &'a str,
}

impl DigitRun<'_> {
    pub fn index(&self) -> Option<u64> {
        self.digits.parse().ok()
    }
}

/// Split `base_name` around its last maximal run of ASCII digits, scanning
/// backwards from the end. `scan_0012_raw` gives `scan_`, `0012`, `_raw`;
/// `run2_slice007` gives `run2_slice`, `007` and an empty suffix.
pub fn split_digit_run(base_name: &str) -> Option<DigitRun<'_>> {
    let bytes = base_name.as_bytes();
    let digit_end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let digit_start = bytes[..digit_end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |pos| pos + 1);

    Some(DigitRun {
        prefix: &base_name[..digit_start],
        digits: &base_name[digit_start..digit_end],
        suffix: &base_name[digit_end..],
    })
}

/// Scan `directory` for files with `extension` (case-sensitive, no leading
/// dot) and infer the stack template.
///
/// A missing directory or one without matching files yields the empty
/// [`ImportRange`]; this is not an error.
pub fn resolve(directory: impl AsRef<Path>, extension: &str) -> ImportRange {
    let directory = directory.as_ref();
    let mut names = matching_file_names(directory, extension);
    names.sort();

    let mut range = ImportRange::default();
    let mut min_index_seen: Option<u64> = None;

    for name in &names {
        let Some(stem) = Path::new(name).file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(run) = split_digit_run(stem) else {
            debug!(file = %name, "no slice index in file name");
            continue;
        };
        let Some(index) = run.index() else {
            warn!(file = %name, digits = run.digits, "slice index out of range");
            continue;
        };

        match min_index_seen {
            None => {
                range.start_index = index;
                range.end_index = index;
                range.digit_width = run.digits.len();
            }
            Some(_) => {
                range.end_index = range.end_index.max(index);
                range.digit_width = range.digit_width.min(run.digits.len());
            }
        }
        if min_index_seen.is_none_or(|min| index < min) {
            min_index_seen = Some(index);
            range.start_index = index;
            range.prefix = run.prefix.to_string();
            range.suffix = run.suffix.to_string();
        }
        range.total_files += 1;
    }

    if range.total_files > 0 {
        range.extension = extension.to_string();
        debug!(
            directory = %directory.display(),
            extension,
            start = range.start_index,
            end = range.end_index,
            digits = range.digit_width,
            files = range.total_files,
            "resolved slice stack"
        );
    }
    range
}

/// Resolve `directory` using the first of [`KNOWN_EXTENSIONS`] that has at
/// least one matching file.
pub fn resolve_directory(directory: impl AsRef<Path>) -> ImportRange {
    let directory = directory.as_ref();
    KNOWN_EXTENSIONS
        .iter()
        .find(|ext| !matching_file_names(directory, ext).is_empty())
        .map(|ext| resolve(directory, ext))
        .unwrap_or_default()
}

fn matching_file_names(directory: &Path, extension: &str) -> Vec<String> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(directory = %directory.display(), error = %err, "cannot list directory");
            }
            return Vec::new();
        }
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext == extension)
        })
        .collect()
}
