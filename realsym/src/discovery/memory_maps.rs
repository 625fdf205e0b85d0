//! Memory mapping utilities for process address space analysis
//!
//! This module parses `/proc/self/maps` so that every range the resolver is
//! about to dereference can be checked against what the kernel actually has
//! mapped, and mapped readable, in this process.

use crate::domain::LookupError;
use log::debug;
use serde::Serialize;
use std::fs;

/// A half-open address range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MemoryRange {
    pub start: usize,
    pub end: usize,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Check if `len` bytes starting at `addr` all fall within this range
    #[must_use]
    pub fn contains_span(&self, addr: usize, len: usize) -> bool {
        match addr.checked_add(len) {
            Some(span_end) => addr >= self.start && span_end <= self.end,
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One line of `/proc/self/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub range: MemoryRange,
    pub readable: bool,
    pub pathname: Option<String>,
}

/// Snapshot of the process's memory mappings, sorted by start address
#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    regions: Vec<MappedRegion>,
}

impl MemoryMap {
    /// Read the current process's mappings
    ///
    /// # Errors
    /// Returns [`LookupError::MemoryMaps`] if `/proc/self/maps` cannot be read,
    /// or [`LookupError::Enumeration`] if a line cannot be parsed
    pub fn current() -> Result<Self, LookupError> {
        let maps = fs::read_to_string("/proc/self/maps").map_err(LookupError::MemoryMaps)?;
        let map = Self::parse(&maps)?;
        debug!("Read {} mappings from /proc/self/maps", map.regions.len());
        Ok(map)
    }

    /// Parse the text format of `/proc/<pid>/maps`
    ///
    /// # Errors
    /// Returns [`LookupError::Enumeration`] on a malformed line
    pub fn parse(maps: &str) -> Result<Self, LookupError> {
        let mut regions = Vec::new();

        for line in maps.lines().filter(|l| !l.trim().is_empty()) {
            // "start-end perms offset dev inode pathname"
            let Some((range, rest)) = next_field(line) else {
                return Err(malformed(line));
            };
            let Some((perms, mut rest)) = next_field(rest) else {
                return Err(malformed(line));
            };
            let Some((start, end)) = range.split_once('-') else {
                return Err(malformed(line));
            };
            let start = usize::from_str_radix(start, 16).map_err(|_| malformed(line))?;
            let end = usize::from_str_radix(end, 16).map_err(|_| malformed(line))?;
            if end < start {
                return Err(malformed(line));
            }

            // offset, dev and inode; the pathname is everything after them
            // and may contain spaces
            for _ in 0..3 {
                rest = next_field(rest).map_or("", |(_, after)| after);
            }
            let pathname = Some(rest.trim()).filter(|p| !p.is_empty()).map(String::from);

            regions.push(MappedRegion {
                range: MemoryRange { start, end },
                readable: perms.starts_with('r'),
                pathname,
            });
        }

        regions.sort_by_key(|r| r.range.start);
        Ok(Self { regions })
    }

    #[must_use]
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }

    /// Whether every byte of `range` is backed by a readable mapping
    ///
    /// Adjacent readable regions are joined, since a single ELF segment is
    /// often split across a file-backed mapping and an anonymous one.
    #[must_use]
    pub fn covers(&self, range: MemoryRange) -> bool {
        if range.is_empty() {
            return true;
        }

        let mut cursor = range.start;
        for region in &self.regions {
            if region.range.end <= cursor {
                continue;
            }
            if region.range.start > cursor || !region.readable {
                return false;
            }
            cursor = region.range.end;
            if cursor >= range.end {
                return true;
            }
        }
        false
    }
}

/// Split off the next whitespace-delimited field
fn next_field(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    let end = text.find(char::is_whitespace).unwrap_or(text.len());
    Some(text.split_at(end))
}

fn malformed(line: &str) -> LookupError {
    LookupError::Enumeration(format!("unparseable /proc/self/maps line: {line:?}"))
}
