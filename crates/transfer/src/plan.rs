use std::ops::Range;

use crate::DEFAULT_CHUNK_SIZE;

/// Position of one chunk within a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u64,
    pub range: Range<u64>,
}

impl ChunkDescriptor {
    /// Length of the chunk in bytes.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Returns `true` for a zero-length chunk (never produced by a plan).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How a file of a given size is split into fixed-size chunks.
///
/// Chunk `i` covers `[i * chunk_size, min((i + 1) * chunk_size, size))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// Plans a file of `size` bytes.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(size: u64, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            size,
            chunk_size: chunk_size as u64,
        }
    }

    /// Total file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Chunk size in bytes (the last chunk may be shorter).
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks; 0 for an empty file.
    pub fn total_chunks(&self) -> u64 {
        self.size.div_ceil(self.chunk_size)
    }

    /// Byte range of chunk `index`, or `None` past the end.
    pub fn range(&self, index: u64) -> Option<Range<u64>> {
        if index >= self.total_chunks() {
            return None;
        }
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.size);
        Some(start..end)
    }

    /// Descriptor of chunk `index`, or `None` past the end.
    pub fn descriptor(&self, index: u64) -> Option<ChunkDescriptor> {
        self.range(index).map(|range| ChunkDescriptor { index, range })
    }

    /// Lazily iterates over every chunk.
    pub fn chunks(&self) -> ChunkIter {
        self.chunks_from(0)
    }

    /// Lazily iterates starting at chunk `index` (for restarting a plan).
    pub fn chunks_from(&self, index: u64) -> ChunkIter {
        ChunkIter {
            plan: *self,
            next: index,
        }
    }
}

/// Iterator over the chunks of a [`ChunkPlan`].
#[derive(Debug, Clone)]
pub struct ChunkIter {
    plan: ChunkPlan,
    next: u64,
}

impl Iterator for ChunkIter {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.plan.descriptor(self.next)?;
        self.next += 1;
        Some(descriptor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.total_chunks().saturating_sub(self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkIter {}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn twenty_mib_file_yields_three_chunks() {
        let plan = ChunkPlan::new(20 * MIB, 7 * MIB as usize);
        assert_eq!(plan.total_chunks(), 3);

        let lens: Vec<u64> = plan.chunks().map(|c| c.len()).collect();
        assert_eq!(lens, vec![7 * MIB, 7 * MIB, 6 * MIB]);
    }

    #[test]
    fn ranges_partition_the_file() {
        for size in [1u64, 3, 4, 5, 7, 8, 9, 63, 64, 65, 1000] {
            for chunk_size in [1usize, 2, 4, 7, 64] {
                let plan = ChunkPlan::new(size, chunk_size);
                assert_eq!(plan.total_chunks(), size.div_ceil(chunk_size as u64));

                let mut expected_start = 0;
                for chunk in plan.chunks() {
                    assert_eq!(chunk.range.start, expected_start);
                    assert!(!chunk.is_empty());
                    assert!(chunk.len() <= chunk_size as u64);
                    expected_start = chunk.range.end;
                }
                assert_eq!(expected_start, size, "size={size} chunk={chunk_size}");
            }
        }
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let plan = ChunkPlan::new(0, 4);
        assert_eq!(plan.total_chunks(), 0);
        assert_eq!(plan.chunks().count(), 0);
        assert!(plan.range(0).is_none());
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let plan = ChunkPlan::new(8, 4);
        assert_eq!(plan.total_chunks(), 2);
        assert_eq!(plan.range(1), Some(4..8));
        assert!(plan.range(2).is_none());
    }

    #[test]
    fn restart_from_index() {
        let plan = ChunkPlan::new(10, 4);
        let rest: Vec<u64> = plan.chunks_from(1).map(|c| c.index).collect();
        assert_eq!(rest, vec![1, 2]);
        assert_eq!(plan.chunks_from(1).len(), 2);
        assert_eq!(plan.chunks_from(5).count(), 0);
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        let plan = ChunkPlan::new(1, 0);
        assert_eq!(plan.chunk_size(), DEFAULT_CHUNK_SIZE as u64);
    }
}
