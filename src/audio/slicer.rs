/// Turns arbitrarily sized, possibly interleaved device buffers into owned
/// fixed-size mono blocks.
///
/// Input slices are only borrowed for the duration of `push`; every sample is
/// copied into the slicer before the call returns.
#[derive(Debug)]
pub struct BlockSlicer {
    block_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl BlockSlicer {
    pub fn new(block_size: usize, channels: u16) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            channels: channels.max(1) as usize,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Copy `input` in (down-mixing to mono) and emit every completed block
    pub fn push(&mut self, input: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        if self.channels == 1 {
            self.pending.extend_from_slice(input);
        } else {
            // Average interleaved channels; a trailing partial frame is ignored
            let scale = 1.0 / self.channels as f32;
            self.pending.extend(
                input
                    .chunks_exact(self.channels)
                    .map(|frame| frame.iter().sum::<f32>() * scale),
            );
        }

        while self.pending.len() >= self.block_size {
            let block: Vec<f32> = self.pending.drain(..self.block_size).collect();
            emit(block);
        }
    }

    /// Samples buffered towards the next block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop the incomplete tail, returning how many samples were discarded
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

/// Scale a signed 16-bit sample into [-1.0, 1.0)
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
