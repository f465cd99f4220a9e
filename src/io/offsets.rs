//! Byte-range slicing of large files at record-safe boundaries.
//!
//! Ranges are computed from the file size alone, without scanning content.
//! Every range after the first starts `delimiter.len()` bytes before its
//! nominal boundary and is that many bytes longer. A reader of such a range
//! discards everything up to and including the first delimiter it sees; those
//! bytes belong to the previous range, which reads past its own end until it
//! completes its last record.

/// A `{offset, length}` pair produced by [`compute_offsets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    #[must_use]
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// One past the last byte covered by this range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// A byte range within a named file or object, consumed once by a fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SliceDescriptor {
    pub path: String,
    pub offset: u64,
    pub length: u64,
    /// Size of the whole file or object.
    pub total: u64,
}

impl SliceDescriptor {
    pub fn new(path: impl Into<String>, offset: u64, length: u64, total: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            length,
            total,
        }
    }

    /// A descriptor spanning the whole object.
    pub fn whole(path: impl Into<String>, total: u64) -> Self {
        Self::new(path, 0, total, total)
    }

    /// Whether this slice reaches the end of its file.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.offset + self.length >= self.total
    }
}

/// Compute the byte ranges for a file of `total` bytes.
///
/// * `total == 0` yields no ranges.
/// * `total < chunk_size` yields the single range `{0, total}`.
/// * Otherwise the first range is `{0, chunk_size}` and each following range
///   overlaps its predecessor by exactly `delimiter.len()` bytes.
///
/// # Examples
/// ```
/// use ironbeam_files::io::offsets::{compute_offsets, ByteRange};
///
/// assert_eq!(
///     compute_offsets(10, 20, "\n"),
///     vec![ByteRange::new(0, 10), ByteRange::new(9, 11)]
/// );
/// ```
///
/// # Panics
/// Panics if `chunk_size` is zero.
#[must_use]
pub fn compute_offsets(chunk_size: u64, total: u64, delimiter: &str) -> Vec<ByteRange> {
    assert!(chunk_size > 0, "chunk_size must be greater than zero");
    if total == 0 {
        return vec![];
    }
    if total < chunk_size {
        return vec![ByteRange::new(0, total)];
    }

    let delta = delimiter.len() as u64;
    let mut ranges = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    ranges.push(ByteRange::new(0, chunk_size));

    let mut boundary = chunk_size;
    while boundary < total {
        let body = chunk_size.min(total - boundary);
        let offset = boundary.saturating_sub(delta);
        ranges.push(ByteRange::new(offset, body + (boundary - offset)));
        boundary += chunk_size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_has_no_ranges() {
        assert!(compute_offsets(10, 0, "\n").is_empty());
    }

    #[test]
    fn small_file_is_one_range() {
        assert_eq!(compute_offsets(10, 7, "\n"), vec![ByteRange::new(0, 7)]);
    }

    #[test]
    fn exact_multiple_has_no_short_tail() {
        assert_eq!(compute_offsets(10, 10, "\n"), vec![ByteRange::new(0, 10)]);
        assert_eq!(
            compute_offsets(10, 30, "\n"),
            vec![
                ByteRange::new(0, 10),
                ByteRange::new(9, 11),
                ByteRange::new(19, 11),
            ]
        );
    }

    #[test]
    fn short_tail_starts_early() {
        assert_eq!(
            compute_offsets(10, 25, "\r\n"),
            vec![
                ByteRange::new(0, 10),
                ByteRange::new(8, 12),
                ByteRange::new(18, 7),
            ]
        );
    }

    #[test]
    fn ranges_cover_file_with_delimiter_overlap() {
        for total in 1..200u64 {
            for chunk in 1..40u64 {
                let delim = "ab";
                let ranges = compute_offsets(chunk, total, delim);
                assert_eq!(ranges[0].offset, 0);
                assert_eq!(ranges.last().unwrap().end(), total);
                for pair in ranges.windows(2) {
                    let overlap = pair[0].end() - pair[1].offset;
                    assert_eq!(overlap, (delim.len() as u64).min(pair[0].end()));
                }
                let covered: u64 = ranges.iter().map(|r| r.length).sum::<u64>()
                    - ranges
                        .windows(2)
                        .map(|p| p[0].end() - p[1].offset)
                        .sum::<u64>();
                assert_eq!(covered, total);
            }
        }
    }

    #[test]
    fn final_descriptor_detection() {
        assert!(SliceDescriptor::new("f", 20, 10, 30).is_final());
        assert!(!SliceDescriptor::new("f", 9, 11, 30).is_final());
    }
}
