//! Size-bounded payload accumulation
//!
//! Serialized chunks are appended to a buffer for as long as the buffer stays
//! under the byte limit. When appending a chunk would meet or exceed the limit
//! the buffer is handed back for sending and the chunk starts a new buffer, so
//! every flushed buffer is below the limit unless it holds a single chunk that
//! is oversized on its own.

/// Accumulates chunks into payload buffers of bounded size
#[derive(Debug)]
pub struct Chunker {
    max_bytes: usize,
    buffer: Vec<u8>,
}

impl Chunker {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            buffer: Vec::new(),
        }
    }

    /// Add a chunk, returning the full buffer that has to be sent first, if any
    ///
    /// Empty chunks are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        if chunk.is_empty() {
            return None;
        }

        let flushed = if !self.buffer.is_empty()
            && self.buffer.len() + chunk.len() >= self.max_bytes
        {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        };

        self.buffer.extend_from_slice(chunk);
        flushed
    }

    /// Take whatever is buffered
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(max: usize, chunks: &[usize]) -> Vec<usize> {
        let mut chunker = Chunker::new(max);
        let mut out = Vec::new();
        for size in chunks {
            if let Some(buf) = chunker.push(&vec![b'x'; *size]) {
                out.push(buf.len());
            }
        }
        out.extend(chunker.finish().map(|b| b.len()));
        out
    }

    #[test]
    fn test_flush_when_limit_would_be_met() {
        // 40 + 40 = 80 < 100, adding 20 would reach 100
        assert_eq!(run(100, &[40, 40, 20, 10]), vec![80, 30]);
    }

    #[test]
    fn test_oversized_chunk_goes_alone() {
        assert_eq!(run(100, &[10, 250, 10]), vec![10, 250, 10]);
    }

    #[test]
    fn test_empty_chunks_dropped() {
        assert_eq!(run(100, &[0, 0]), Vec::<usize>::new());
        assert_eq!(run(100, &[0, 5, 0]), vec![5]);
    }

    #[test]
    fn test_buffers_stay_below_limit() {
        let sizes: Vec<usize> = (1..200).map(|i| (i * 37) % 90 + 1).collect();
        let out = run(100, &sizes);
        assert!(out.iter().all(|len| *len < 100));
        assert_eq!(out.iter().sum::<usize>(), sizes.iter().sum::<usize>());
    }
}
