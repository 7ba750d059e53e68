//! Generates the expected slice file names of a stack.

use crate::{
    enums::StackingOrder,
    slice_pattern::{ImportRange, SliceFileDescriptor},
};

use std::{
    iter::FusedIterator,
    path::{Path, PathBuf},
};

/// The ordered list of files an [`ImportRange`] describes. Nothing is
/// computed until iterated, and every call to [`FileList::iter`] starts
/// over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileList {
    directory: PathBuf,
    range: ImportRange,
    stacking_order: StackingOrder,
}

impl FileList {
    pub fn new(
        directory: impl Into<PathBuf>,
        range: ImportRange,
        stacking_order: StackingOrder,
    ) -> Self {
        Self {
            directory: directory.into(),
            range,
            stacking_order,
        }
    }

    pub fn range(&self) -> &ImportRange {
        &self.range
    }

    pub fn stacking_order(&self) -> StackingOrder {
        self.stacking_order
    }

    pub fn len(&self) -> usize {
        usize::try_from(self.range.len()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `prefix + zero padded index + suffix + "." + extension`. The index is
    /// never truncated when it is wider than `digit_width`.
    pub fn file_name(&self, index: u64) -> String {
        format_file_name(&self.range, index)
    }

    pub fn iter(&self) -> FileListIter<'_> {
        FileListIter {
            list: self,
            front: 0,
            back: self.range.len(),
        }
    }

    /// Descriptors whose files are not on disk
    pub fn missing(&self) -> Vec<SliceFileDescriptor> {
        self.iter().filter(|file| !file.exists).collect()
    }

    /// Paths of the files that exist, in list order
    pub fn existing_paths(&self) -> Vec<PathBuf> {
        self.iter()
            .filter(|file| file.exists)
            .map(|file| file.path)
            .collect()
    }

    fn descriptor(&self, position: u64) -> SliceFileDescriptor {
        let range = &self.range;
        let index = match self.stacking_order {
            StackingOrder::LowToHigh => range.start_index + position,
            StackingOrder::HighToLow | StackingOrder::Unknown => range.end_index - position,
        };
        let path = self.directory.join(format_file_name(range, index));
        let exists = path.exists();

        SliceFileDescriptor {
            index,
            path,
            prefix: range.prefix.clone(),
            suffix: range.suffix.clone(),
            extension: range.extension.clone(),
            digit_width: range.digit_width,
            exists,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

pub(crate) fn format_file_name(range: &ImportRange, index: u64) -> String {
    format!(
        "{}{:0width$}{}.{}",
        range.prefix,
        index,
        range.suffix,
        range.extension,
        width = range.digit_width
    )
}

impl<'a> IntoIterator for &'a FileList {
    type Item = SliceFileDescriptor;
    type IntoIter = FileListIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct FileListIter<'a> {
    list: &'a FileList,
    front: u64,
    back: u64,
}

impl Iterator for FileListIter<'_> {
    type Item = SliceFileDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let descriptor = self.list.descriptor(self.front);
        self.front += 1;
        Some(descriptor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.back - self.front).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for FileListIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.list.descriptor(self.back))
    }
}

impl ExactSizeIterator for FileListIter<'_> {}

impl FusedIterator for FileListIter<'_> {}
