//! AES-3 element packing for D-10 audio.
//!
//! Every content package carries one AES-3 element with eight 4-byte
//! sub-frames per sample. Incoming PCM does not have to line up with the
//! 5-frame 525-line sample sequence, so samples are queued in blocks, one
//! block per content package, and a block is written once it holds the
//! number of samples its sequence position requires.

use crate::layout::{aes3_block_size, D10SampleRate, AES3_HEADER_SIZE, AES3_SAMPLE_SIZE};
use crate::package::{ContentPackage, MAX_AUDIO_CHANNELS};
use rewrap_essence::ByteBuffer;
use std::collections::VecDeque;

/// Per-frame audio sample counts of a line standard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSequence {
    counts: &'static [u32],
    max_final_padding: u32,
}

impl AudioSequence {
    pub fn for_rate(sample_rate: D10SampleRate) -> Self {
        let max_final_padding = match sample_rate {
            D10SampleRate::Rate625_50i => 0,
            D10SampleRate::Rate525_60i => 4,
        };
        AudioSequence {
            counts: sample_rate.video_rate().audio_sample_sequence(),
            max_final_padding,
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sample count at sequence position `index`, taken modulo the length
    pub fn sample_count(&self, index: usize) -> u32 {
        debug_assert!(!self.counts.is_empty());
        self.counts[index % self.counts.len()]
    }

    /// Samples in one full cycle
    pub fn sum(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn max_samples(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Most silent samples the last block may be padded with
    pub fn max_final_padding(&self) -> u32 {
        self.max_final_padding
    }

    pub fn counts(&self) -> &'static [u32] {
        self.counts
    }
}

/// Sequence phases that match a run of per-package sample counts.
///
/// `buffered` holds the sample counts of packages already received and
/// `next` the count of the package that triggered the check.
pub fn matching_sequence_offsets(
    sequence: &AudioSequence,
    buffered: &[u32],
    next: Option<u32>,
) -> Vec<u8> {
    (0..sequence.len())
        .filter(|&offset| {
            let buffered_match = buffered
                .iter()
                .enumerate()
                .all(|(i, &samples)| samples == sequence.sample_count(i + offset));
            let next_match = next
                .map(|samples| samples == sequence.sample_count(buffered.len() + offset))
                .unwrap_or(true);
            buffered_match && next_match
        })
        .map(|offset| offset as u8)
        .collect()
}

/// The only sequence phase matching the sample counts, or `None` when no
/// phase or more than one phase matches
pub fn resolve_sequence_offset(
    sequence: &AudioSequence,
    buffered: &[u32],
    next: Option<u32>,
) -> Option<u8> {
    match matching_sequence_offsets(sequence, buffered, next).as_slice() {
        [offset] => Some(*offset),
        _ => None,
    }
}

/// Queue of AES-3 element values waiting to be written
#[derive(Debug, Clone)]
pub struct Aes3Packer {
    sequence: AudioSequence,
    channel_count: u32,
    bytes_per_sample: u32,
    number_block_index: bool,
    /// Sequence position of the front block
    sequence_index: usize,
    blocks: VecDeque<ByteBuffer>,
}

impl Aes3Packer {
    pub fn new(sample_rate: D10SampleRate, channel_count: u32, quantization_bits: u32) -> Self {
        let sequence = AudioSequence::for_rate(sample_rate);
        let mut blocks = VecDeque::with_capacity(sequence.len() + 1);
        blocks.push_back(ByteBuffer::with_capacity(
            aes3_block_size(sequence.max_samples()) as usize,
        ));
        Aes3Packer {
            sequence,
            channel_count: channel_count.min(MAX_AUDIO_CHANNELS as u32),
            bytes_per_sample: (quantization_bits + 7) / 8,
            number_block_index: sample_rate == D10SampleRate::Rate525_60i,
            sequence_index: 0,
            blocks,
        }
    }

    pub fn sequence(&self) -> &AudioSequence {
        &self.sequence
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn set_sequence_index(&mut self, index: usize) {
        self.sequence_index = index % self.sequence.len();
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.bytes_per_sample
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Sequence position of the last queued block
    pub fn last_block_sequence_index(&self) -> usize {
        (self.sequence_index + self.blocks.len() - 1) % self.sequence.len()
    }

    fn block_samples(block: &ByteBuffer) -> u32 {
        (block.size() as u32).saturating_sub(AES3_HEADER_SIZE) / AES3_SAMPLE_SIZE
    }

    fn init_block(&self, block: &mut ByteBuffer, index: usize) {
        let samples = self.sequence.sample_count(index);
        let mut header = [0u8; AES3_HEADER_SIZE as usize];
        if self.number_block_index {
            header[0] = (index & 0x07) as u8;
        }
        header[1..3].copy_from_slice(&(samples as u16).to_le_bytes());
        header[3] = ((1u32 << self.channel_count) - 1) as u8;

        block.min_allocate(aes3_block_size(samples) as usize);
        block.set_bytes(&header);
    }

    fn append_silence(block: &mut ByteBuffer, samples: u32) {
        let mut silent = [0u8; AES3_SAMPLE_SIZE as usize];
        for (channel, subframe) in silent.chunks_exact_mut(4).enumerate() {
            subframe[0] = channel as u8;
        }
        for _ in 0..samples {
            block.append(&silent);
        }
    }

    /// Pack one sample of every channel into 8 sub-frames
    fn pack_sample(&self, package: &ContentPackage, sample: usize, out: &mut [u8]) {
        let bps = self.bytes_per_sample as usize;
        for (channel, subframe) in out.chunks_exact_mut(4).enumerate() {
            let c = channel as u8;
            if channel >= self.channel_count as usize {
                subframe.copy_from_slice(&[c, 0, 0, 0]);
                continue;
            }
            let pcm = &package.audio(channel)[sample * bps..(sample + 1) * bps];
            if bps == 3 {
                subframe[0] = c | ((pcm[0] << 4) & 0xF0);
                subframe[1] = ((pcm[0] >> 4) & 0x0F) | ((pcm[1] << 4) & 0xF0);
                subframe[2] = ((pcm[1] >> 4) & 0x0F) | ((pcm[2] << 4) & 0xF0);
                subframe[3] = (pcm[2] >> 4) & 0x0F;
            } else {
                subframe[0] = c;
                subframe[1] = (pcm[0] << 4) & 0xF0;
                subframe[2] = ((pcm[0] >> 4) & 0x0F) | ((pcm[1] << 4) & 0xF0);
                subframe[3] = (pcm[1] >> 4) & 0x0F;
            }
        }
    }

    /// Append the audio of `package`, opening new blocks as earlier ones
    /// reach their sequence sample count
    pub fn update(&mut self, package: &ContentPackage) {
        let input_count = package.audio_sample_count(self.bytes_per_sample) as usize;
        let mut sample_bytes = [0u8; AES3_SAMPLE_SIZE as usize];
        let mut input_index = 0;

        while input_index < input_count {
            let index = self.last_block_sequence_index();
            let mut block = self.blocks.pop_back().unwrap_or_default();
            if block.is_empty() {
                self.init_block(&mut block, index);
            }

            let remaining_block =
                (self.sequence.sample_count(index) - Self::block_samples(&block)) as usize;
            let count = remaining_block.min(input_count - input_index);
            for sample in input_index..input_index + count {
                self.pack_sample(package, sample, &mut sample_bytes);
                block.append(&sample_bytes);
            }
            input_index += count;
            self.blocks.push_back(block);

            if remaining_block == count && input_index < input_count {
                self.blocks.push_back(ByteBuffer::new());
            }
        }
    }

    /// Pad the last block with silence if it is short by no more than the
    /// allowed final padding
    pub fn final_update(&mut self) {
        let index = self.last_block_sequence_index();
        let mut block = self.blocks.pop_back().unwrap_or_default();
        if block.is_empty() {
            self.init_block(&mut block, index);
        }
        let remaining = self.sequence.sample_count(index) - Self::block_samples(&block);
        if remaining <= self.sequence.max_final_padding() {
            Self::append_silence(&mut block, remaining);
        }
        self.blocks.push_back(block);
    }

    /// Fill the front block with silence for a file without audio channels
    pub fn fill_silent_front(&mut self) {
        let index = self.sequence_index;
        let mut block = self.blocks.pop_front().unwrap_or_default();
        self.init_block(&mut block, index);
        Self::append_silence(&mut block, self.sequence.sample_count(index));
        self.blocks.push_front(block);
    }

    /// Blocks holding their full sequence sample count
    pub fn complete_block_count(&self) -> usize {
        let mut count = self.blocks.len();
        if let Some(back) = self.blocks.back() {
            let required = self.sequence.sample_count(self.last_block_sequence_index());
            if Self::block_samples(back) < required || back.is_empty() {
                count -= 1;
            }
        }
        count
    }

    /// Element value of the front block
    pub fn front(&self) -> &[u8] {
        self.blocks
            .front()
            .map(ByteBuffer::as_slice)
            .unwrap_or_default()
    }

    /// Drop the written front block and move to the next sequence position
    pub fn pop_front(&mut self) {
        if self.blocks.len() > 1 {
            self.blocks.pop_front();
        } else if let Some(front) = self.blocks.front_mut() {
            front.reset();
        }
        self.sequence_index = (self.sequence_index + 1) % self.sequence.len();
    }

    /// Samples held by the last queued block
    pub fn pending_samples(&self) -> u32 {
        self.blocks.back().map(Self::block_samples).unwrap_or(0)
    }
}
