//! Integer fields whose on-disk width depends on the value they hold.

use crate::{Error, Result};

/// Widths a box `size` field can take on disk.
pub const BOX_SIZE_BIT_DEPTHS: &[u32] = &[32, 64];

/// An unsigned integer that remembers which of several valid bit widths it
/// is currently encoded with.
///
/// When overridable, assigning a value that does not fit the current width
/// widens the field to the smallest valid width that does. The width never
/// shrinks on its own.
///
/// Equality compares the value only.
#[derive(Debug, Clone)]
pub struct VariableLengthField {
    valid_bit_depths: &'static [u32],
    bit_depth: u32,
    value: u64,
    overridable: bool,
    dirty: bool,
}

impl VariableLengthField {
    /// Create a field holding `value` at the smallest width that fits it.
    ///
    /// `valid_bit_depths` must be sorted ascending and non-empty.
    pub fn new(valid_bit_depths: &'static [u32], value: u64) -> Result<Self> {
        if valid_bit_depths.is_empty() || !valid_bit_depths.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::validation(
                "valid bit depths must be a non-empty ascending list",
            ));
        }
        if valid_bit_depths.iter().any(|d| *d == 0 || *d > 64) {
            return Err(Error::validation("bit depths must be between 1 and 64"));
        }

        let bit_depth = smallest_fitting(valid_bit_depths, value).ok_or_else(|| {
            Error::validation(format!(
                "value {} needs more than {} bits",
                value,
                valid_bit_depths[valid_bit_depths.len() - 1]
            ))
        })?;

        Ok(Self {
            valid_bit_depths,
            bit_depth,
            value,
            overridable: true,
            dirty: true,
        })
    }

    /// A box `size` field holding `value`, 32 bits wide unless it needs 64.
    pub fn for_box_size(value: u64) -> Self {
        Self {
            valid_bit_depths: BOX_SIZE_BIT_DEPTHS,
            bit_depth: if fits(value, 32) { 32 } else { 64 },
            value,
            overridable: true,
            dirty: true,
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    pub fn valid_bit_depths(&self) -> &'static [u32] {
        self.valid_bit_depths
    }

    pub fn is_overridable(&self) -> bool {
        self.overridable
    }

    /// Allow or forbid automatic widening in [`set_value`](Self::set_value).
    pub fn set_overridable(&mut self, overridable: bool) {
        self.overridable = overridable;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Assign a new value, widening the bit depth if allowed.
    pub fn set_value(&mut self, value: u64) -> Result<()> {
        let max_depth = self.valid_bit_depths[self.valid_bit_depths.len() - 1];
        if !fits(value, max_depth) {
            return Err(Error::validation(format!(
                "value {} needs more than {} bits",
                value, max_depth
            )));
        }

        if !fits(value, self.bit_depth) {
            if !self.overridable {
                return Err(Error::validation(format!(
                    "value {} does not fit in fixed bit depth {}",
                    value, self.bit_depth
                )));
            }
            // Cannot fail: the largest depth fits.
            self.bit_depth = smallest_fitting(self.valid_bit_depths, value).unwrap_or(max_depth);
        }

        self.value = value;
        self.dirty = true;
        Ok(())
    }

    /// Change the encoded width.
    pub fn set_bit_depth(&mut self, bit_depth: u32) -> Result<()> {
        if !self.valid_bit_depths.contains(&bit_depth) {
            return Err(Error::validation(format!(
                "bit depth {} is not one of {:?}",
                bit_depth, self.valid_bit_depths
            )));
        }
        if !fits(self.value, bit_depth) {
            return Err(Error::validation(format!(
                "current value {} does not fit in {} bits",
                self.value, bit_depth
            )));
        }

        if bit_depth != self.bit_depth {
            self.bit_depth = bit_depth;
            self.dirty = true;
        }
        Ok(())
    }
}

impl PartialEq for VariableLengthField {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for VariableLengthField {}

fn fits(value: u64, bit_depth: u32) -> bool {
    bit_depth >= 64 || value >> bit_depth == 0
}

fn smallest_fitting(valid_bit_depths: &[u32], value: u64) -> Option<u32> {
    valid_bit_depths.iter().copied().find(|d| fits(value, *d))
}
