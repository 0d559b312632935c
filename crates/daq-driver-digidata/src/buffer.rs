//! Host memory for streamed samples.
//!
//! The driver streams into (and out of) a ring of `DATABUFFER` nodes linked
//! both ways. A [`BufferList`] owns one contiguous sample allocation cut
//! into nodes and keeps the node array at a fixed address, so the pointers
//! it hands to the driver stay valid for as long as the list is alive.

use std::ptr;

use axdd132x_sys::DATABUFFER;

use crate::error::{DigidataError, Result};

/// A circular chain of sample buffers.
pub struct BufferList {
    data: Vec<i16>,
    nodes: Vec<DATABUFFER>,
}

// SAFETY: every pointer inside `nodes` refers to memory owned by this value.
unsafe impl Send for BufferList {}

impl BufferList {
    /// Zeroed storage for `total_samples`, split across `buffer_count` nodes.
    pub fn new(total_samples: usize, buffer_count: usize) -> Result<Self> {
        Self::from_samples(vec![0; total_samples], buffer_count)
    }

    /// Storage pre-filled with `samples`, for output waveforms.
    pub fn from_samples(samples: Vec<i16>, buffer_count: usize) -> Result<Self> {
        if samples.is_empty() {
            return Err(DigidataError::InvalidConfig {
                message: "buffer list needs at least one sample".to_string(),
            });
        }
        if buffer_count == 0 || buffer_count > samples.len() {
            return Err(DigidataError::InvalidConfig {
                message: format!(
                    "cannot split {} samples into {} buffers",
                    samples.len(),
                    buffer_count
                ),
            });
        }
        let mut list = Self {
            data: samples,
            nodes: vec![DATABUFFER::default(); buffer_count],
        };
        list.link();
        Ok(list)
    }

    fn link(&mut self) {
        let total = self.data.len();
        let count = self.nodes.len();
        let base = total / count;
        let extra = total % count;

        let data = self.data.as_mut_ptr();
        let nodes = self.nodes.as_mut_ptr();
        let mut offset = 0;
        for i in 0..count {
            let len = base + usize::from(i < extra);
            // SAFETY: i, (i + 1) % count and (i + count - 1) % count are in
            // bounds of nodes, and offset + len <= total.
            unsafe {
                let node = &mut *nodes.add(i);
                node.uNumSamples = len as u32;
                node.uFlags = 0;
                node.pnData = data.add(offset);
                node.psDataFlags = ptr::null_mut();
                node.pNextBuffer = nodes.add((i + 1) % count);
                node.pPrevBuffer = nodes.add((i + count - 1) % count);
            }
            offset += len;
        }
    }

    /// Total samples across all nodes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn buffer_count(&self) -> usize {
        self.nodes.len()
    }

    /// Samples in ring order.
    pub fn samples(&self) -> &[i16] {
        &self.data
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.data
    }

    /// The newest `min(position, len)` samples in acquisition order, given
    /// the driver's total sample count. Handles the ring having wrapped.
    pub fn latest(&self, position: i64) -> Vec<i16> {
        let total = self.data.len();
        let position = usize::try_from(position).unwrap_or(0);
        if position <= total {
            return self.data[..position].to_vec();
        }
        let split = position % total;
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&self.data[split..]);
        out.extend_from_slice(&self.data[..split]);
        out
    }

    /// Head of the chain and node count, as the protocol record wants them.
    pub(crate) fn chain(&mut self) -> (*mut DATABUFFER, u32) {
        (self.nodes.as_mut_ptr(), self.nodes.len() as u32)
    }
}

impl std::fmt::Debug for BufferList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferList")
            .field("samples", &self.data.len())
            .field("buffers", &self.nodes.len())
            .finish()
    }
}
