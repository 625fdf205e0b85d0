//! ELF symbol hash tables (`DT_HASH` and `DT_GNU_HASH`)
//!
//! Both walkers take a `probe` callback that inspects a candidate symbol index
//! and reports whether it is the one being searched for. The tables only
//! narrow the search; the name comparison stays with the caller.

use super::image::Image;
use crate::domain::Corruption;
use std::mem::size_of;

/// The SysV ELF hash used by `DT_HASH`
#[must_use]
pub fn sysv_hash(name: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &byte in name {
        h = (h << 4).wrapping_add(u32::from(byte));
        let g = h & 0xf000_0000;
        h ^= g >> 24;
        h &= !g;
    }
    h
}

/// The djb2-style hash used by `DT_GNU_HASH`
#[must_use]
pub fn gnu_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(5381u32, |h, &byte| h.wrapping_mul(33).wrapping_add(u32::from(byte)))
}

/// `DT_HASH`: `nbucket`, `nchain`, `bucket[nbucket]`, `chain[nchain]`
#[derive(Debug, Clone, Copy)]
pub(crate) struct SysvHashTable {
    nbucket: u32,
    nchain: u32,
    buckets: usize,
    chains: usize,
}

impl SysvHashTable {
    pub(crate) fn read(image: &Image<'_>, addr: usize) -> Result<Self, Corruption> {
        let nbucket = image.read_u32("DT_HASH header", addr)?;
        let nchain = image.read_u32("DT_HASH header", addr + 4)?;
        let buckets = addr + 8;
        let chains = Image::element("DT_HASH chains", buckets, nbucket as usize, 4)?;
        Ok(Self { nbucket, nchain, buckets, chains })
    }

    pub(crate) fn find(
        &self,
        image: &Image<'_>,
        name: &[u8],
        mut probe: impl FnMut(u32) -> Result<bool, Corruption>,
    ) -> Result<Option<u32>, Corruption> {
        if self.nbucket == 0 {
            return Ok(None);
        }

        let hash = sysv_hash(name);
        let bucket = Image::element("DT_HASH bucket", self.buckets, (hash % self.nbucket) as usize, 4)?;
        let mut index = image.read_u32("DT_HASH bucket", bucket)?;
        let mut steps = 0u32;

        // STN_UNDEF (0) ends the chain
        while index != 0 {
            if index >= self.nchain {
                return Err(Corruption::ChainIndex { index, limit: self.nchain });
            }
            if probe(index)? {
                return Ok(Some(index));
            }
            steps += 1;
            if steps > self.nchain {
                return Err(Corruption::ChainCycle);
            }
            let link = Image::element("DT_HASH chain", self.chains, index as usize, 4)?;
            index = image.read_u32("DT_HASH chain", link)?;
        }
        Ok(None)
    }
}

/// `DT_GNU_HASH`: header, bloom filter words, buckets, then one chain word
/// per hashed symbol starting at `symoffset`
#[derive(Debug, Clone, Copy)]
pub(crate) struct GnuHashTable {
    nbuckets: u32,
    symoffset: u32,
    bloom_size: u32,
    bloom_shift: u32,
    bloom: usize,
    buckets: usize,
    chains: usize,
}

impl GnuHashTable {
    pub(crate) fn read(image: &Image<'_>, addr: usize) -> Result<Self, Corruption> {
        let nbuckets = image.read_u32("DT_GNU_HASH header", addr)?;
        let symoffset = image.read_u32("DT_GNU_HASH header", addr + 4)?;
        let bloom_size = image.read_u32("DT_GNU_HASH header", addr + 8)?;
        let bloom_shift = image.read_u32("DT_GNU_HASH header", addr + 12)?;

        let bloom = addr + 16;
        let buckets =
            Image::element("DT_GNU_HASH buckets", bloom, bloom_size as usize, size_of::<usize>())?;
        let chains = Image::element("DT_GNU_HASH chains", buckets, nbuckets as usize, 4)?;
        Ok(Self { nbuckets, symoffset, bloom_size, bloom_shift, bloom, buckets, chains })
    }

    pub(crate) fn find(
        &self,
        image: &Image<'_>,
        name: &[u8],
        mut probe: impl FnMut(u32) -> Result<bool, Corruption>,
    ) -> Result<Option<u32>, Corruption> {
        if self.nbuckets == 0 {
            return Ok(None);
        }
        if self.bloom_size == 0 {
            return Err(Corruption::EmptyBloomFilter);
        }

        let hash = gnu_hash(name);
        let word_bits = usize::BITS;

        let word_index = (hash / word_bits) % self.bloom_size;
        let word_addr =
            Image::element("DT_GNU_HASH bloom", self.bloom, word_index as usize, size_of::<usize>())?;
        let word: usize = image.read("DT_GNU_HASH bloom", word_addr)?;
        let mask = (1usize << (hash % word_bits))
            | (1usize << (hash.checked_shr(self.bloom_shift).unwrap_or(0) % word_bits));
        if word & mask != mask {
            return Ok(None);
        }

        let bucket =
            Image::element("DT_GNU_HASH bucket", self.buckets, (hash % self.nbuckets) as usize, 4)?;
        let mut index = image.read_u32("DT_GNU_HASH bucket", bucket)?;
        if index == 0 {
            return Ok(None);
        }
        if index < self.symoffset {
            return Err(Corruption::ChainIndex { index, limit: self.symoffset });
        }

        loop {
            let link = Image::element(
                "DT_GNU_HASH chain",
                self.chains,
                (index - self.symoffset) as usize,
                4,
            )?;
            let chain_hash = image.read_u32("DT_GNU_HASH chain", link)?;
            // The low bit marks the end of the chain; compare the rest
            if (chain_hash | 1) == (hash | 1) && probe(index)? {
                return Ok(Some(index));
            }
            if chain_hash & 1 != 0 {
                return Ok(None);
            }
            index = index.checked_add(1).ok_or(Corruption::ChainCycle)?;
        }
    }
}
