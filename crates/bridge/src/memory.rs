//! Memory cache and read coalescing
//!
//! GDB reads memory in small pieces. Reads are served from a cache of blocks
//! fetched from the agent. Blocks are immutable and never merged, so a read
//! that straddles two blocks cannot be answered even though the bytes are
//! cached; such reads fail with `E22`.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// Half-open address range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoryRange {
    pub from: u64,
    pub to: u64,
}

impl MemoryRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn with_len(from: u64, len: u64) -> Self {
        Self {
            from,
            to: from.saturating_add(len),
        }
    }

    pub fn len(&self) -> u64 {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn contains(&self, other: &MemoryRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.from, self.to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    blocks: BTreeMap<MemoryRange, Bytes>,
}

impl MemoryCache {
    /// Store a block. An existing block for the same range is kept.
    pub fn insert(&mut self, range: MemoryRange, data: Bytes) {
        debug_assert_eq!(range.len(), data.len() as u64);
        self.blocks.entry(range).or_insert(data);
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// The part of `wanted` not covered by any cached block.
    ///
    /// Each block is subtracted on its own. A block strictly inside the
    /// remaining range would split it in two; the range is then cut to the
    /// part below the block and the rest is left for a later pass.
    pub fn needed(&self, wanted: MemoryRange) -> Option<MemoryRange> {
        let mut needed = wanted;
        loop {
            let before = needed;
            for block in self.blocks.keys() {
                if needed.is_empty() {
                    return None;
                }
                if block.contains(&needed) {
                    return None;
                }
                if block.from <= needed.from && needed.from < block.to {
                    needed.from = block.to;
                } else if block.from < needed.to && needed.to <= block.to {
                    needed.to = block.from;
                } else if needed.from < block.from && block.to < needed.to {
                    needed.to = block.from;
                }
            }
            if needed.is_empty() {
                return None;
            }
            if needed == before {
                return Some(needed);
            }
        }
    }

    /// The bytes of `wanted`, if a single block holds all of them.
    pub fn read(&self, wanted: MemoryRange) -> Option<&[u8]> {
        self.blocks.iter().find_map(|(range, data)| {
            if !range.contains(&wanted) {
                return None;
            }
            let start = usize::try_from(wanted.from - range.from).ok()?;
            let end = start + usize::try_from(wanted.len()).ok()?;
            data.get(start..end)
        })
    }
}

/// How memory is fetched from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Exactly the bytes that are missing.
    Unbuffered,
    /// Whole aligned chunks of the given size.
    Buffered { chunk_size: u64 },
}

/// The next step towards answering a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Reply(Vec<u8>),
    /// Everything is cached but spread over several blocks.
    Unsatisfiable,
    Fetch {
        range: MemoryRange,
        needed: MemoryRange,
        buffered: bool,
    },
}

pub fn plan(wanted: MemoryRange, cache: &MemoryCache, mode: FetchMode) -> Plan {
    let Some(needed) = cache.needed(wanted) else {
        return match cache.read(wanted) {
            Some(data) => Plan::Reply(data.to_vec()),
            None => Plan::Unsatisfiable,
        };
    };

    match mode {
        FetchMode::Buffered { chunk_size } if chunk_size > 0 => {
            let from = needed.from - needed.from % chunk_size;
            Plan::Fetch {
                range: MemoryRange::with_len(from, chunk_size),
                needed,
                buffered: true,
            }
        }
        _ => Plan::Fetch {
            range: needed,
            needed,
            buffered: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(blocks: &[(u64, u64)]) -> MemoryCache {
        let mut cache = MemoryCache::default();
        for &(from, to) in blocks {
            let range = MemoryRange::new(from, to);
            let data: Vec<u8> = (from..to).map(|a| a as u8).collect();
            cache.insert(range, Bytes::from(data));
        }
        cache
    }

    #[test]
    fn empty_cache_needs_everything() {
        let wanted = MemoryRange::new(0x1000, 0x1004);
        assert_eq!(MemoryCache::default().needed(wanted), Some(wanted));
    }

    #[test]
    fn subtracts_overlapping_blocks() {
        let cache = cache(&[(0x0ff0, 0x1002), (0x1006, 0x1010)]);
        assert_eq!(
            cache.needed(MemoryRange::new(0x1000, 0x1008)),
            Some(MemoryRange::new(0x1002, 0x1006))
        );
    }

    #[test]
    fn block_inside_keeps_lower_part() {
        let cache = cache(&[(0x1004, 0x1008)]);
        assert_eq!(
            cache.needed(MemoryRange::new(0x1000, 0x1010)),
            Some(MemoryRange::new(0x1000, 0x1004))
        );
    }

    #[test]
    fn covered_by_one_block() {
        let cache = cache(&[(0x1000, 0x1100)]);
        let wanted = MemoryRange::new(0x1010, 0x1012);
        assert_eq!(
            plan(wanted, &cache, FetchMode::Unbuffered),
            Plan::Reply(vec![0x10, 0x11])
        );
    }

    #[test]
    fn covered_by_two_blocks_is_unsatisfiable() {
        let cache = cache(&[(0x1000, 0x1004), (0x1004, 0x1008)]);
        let wanted = MemoryRange::new(0x1002, 0x1006);
        assert_eq!(cache.needed(wanted), None);
        assert_eq!(
            plan(wanted, &cache, FetchMode::Unbuffered),
            Plan::Unsatisfiable
        );
    }

    #[test]
    fn buffered_fetch_is_chunk_aligned() {
        let wanted = MemoryRange::new(0x1010, 0x1014);
        assert_eq!(
            plan(
                wanted,
                &MemoryCache::default(),
                FetchMode::Buffered { chunk_size: 256 }
            ),
            Plan::Fetch {
                range: MemoryRange::new(0x1000, 0x1100),
                needed: wanted,
                buffered: true,
            }
        );
    }

    #[test]
    fn existing_blocks_are_not_replaced() {
        let mut cache = cache(&[(0x10, 0x12)]);
        cache.insert(MemoryRange::new(0x10, 0x12), Bytes::from_static(&[0xff, 0xff]));
        assert_eq!(cache.read(MemoryRange::new(0x10, 0x12)), Some(&[0x10, 0x11][..]));
        assert_eq!(cache.len(), 1);
    }
}
