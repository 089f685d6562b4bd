//! Consumer identifier allocation.
//!
//! Every render target (a *consumer*) gets a small, non-zero [`ConsumerId`]
//! from an [`IdPool`]. Resources index their realizations directly by this
//! number, so the pool always hands out the lowest free identifier and
//! reuses freed identifiers before growing.

use std::fmt;
use std::num::NonZeroU32;

/// Number of identifiers tracked by one word of the bitmap.
const WORD_BITS: u32 = u64::BITS;

/// Number of words added whenever the pool runs full.
const GROW_WORDS: usize = 2;

/// Identifier of a consumer (one backend instance bound to one render target).
///
/// `0` is never a valid identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(NonZeroU32);

impl ConsumerId {
    /// Wraps a raw identifier, returning `None` for `0`.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw numeric value of the identifier.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bitmap allocator for [`ConsumerId`]s.
///
/// Identifier `n` lives in bit `(n - 1) % 64` of word `(n - 1) / 64`. The
/// backing vector only ever grows; freeing just clears the bit.
#[derive(Debug, Default, Clone)]
pub struct IdPool {
    words: Vec<u64>,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the lowest free identifier. Never fails.
    pub fn allocate(&mut self) -> ConsumerId {
        let index = match self.words.iter().position(|w| *w != u64::MAX) {
            Some(index) => index,
            None => {
                let index = self.words.len();
                self.words.resize(index + GROW_WORDS, 0);
                index
            }
        };

        let word = &mut self.words[index];
        let bit = (!*word).trailing_zeros();
        *word |= 1u64 << bit;

        ConsumerId(NonZeroU32::MIN.saturating_add(index as u32 * WORD_BITS + bit))
    }

    /// Returns `id` to the pool. Returns `false` if it was not allocated.
    pub fn free(&mut self, id: ConsumerId) -> bool {
        let Some((index, mask)) = Self::locate(id) else {
            return false;
        };
        let Some(word) = self.words.get_mut(index) else {
            log::warn!("IdPool: freeing unknown consumer {id}");
            return false;
        };

        if *word & mask == 0 {
            log::warn!("IdPool: consumer {id} freed twice");
            return false;
        }

        *word &= !mask;
        true
    }

    /// Is `id` currently handed out?
    pub fn is_allocated(&self, id: ConsumerId) -> bool {
        Self::locate(id)
            .and_then(|(index, mask)| self.words.get(index).map(|w| w & mask != 0))
            .unwrap_or(false)
    }

    /// Number of identifiers currently handed out.
    pub fn live(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of identifiers the pool can track without growing.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS as usize
    }

    fn locate(id: ConsumerId) -> Option<(usize, u64)> {
        let n = id.get() - 1;
        let index = usize::try_from(n / WORD_BITS).ok()?;
        Some((index, 1u64 << (n % WORD_BITS)))
    }
}
