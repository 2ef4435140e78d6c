//! Slot table of the magazine

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::{PickError, SlotParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Validated, immutable table of slot offsets and elbow angles.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTable {
    offsets: Vec<Option<f64>>,
    elbows: Vec<f64>,
}

/// An available slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    /// Units: degrees, relative to the calibration reference
    pub offset_deg: f64,

    /// Units: degrees
    pub elbow_deg: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SlotTableError {
    #[error("The slot table is empty")]
    Empty,

    #[error("The slot table has {offsets} offsets but {elbows} elbow angles")]
    LengthMismatch { offsets: usize, elbows: usize },

    #[error("Slot {0} has a non-finite angle")]
    NonFinite(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SlotTable {
    pub fn new(offsets: Vec<Option<f64>>, elbows: Vec<f64>) -> Result<Self, SlotTableError> {
        if offsets.len() != elbows.len() {
            return Err(SlotTableError::LengthMismatch {
                offsets: offsets.len(),
                elbows: elbows.len(),
            });
        }

        if offsets.is_empty() {
            return Err(SlotTableError::Empty);
        }

        for (i, (offset, elbow)) in offsets.iter().zip(elbows.iter()).enumerate() {
            if !elbow.is_finite() || offset.map_or(false, |o| !o.is_finite()) {
                return Err(SlotTableError::NonFinite(i));
            }
        }

        Ok(Self { offsets, elbows })
    }

    pub fn from_params(slots: &[SlotParams]) -> Result<Self, SlotTableError> {
        Self::new(
            slots.iter().map(|s| s.offset_deg).collect(),
            slots.iter().map(|s| s.elbow_deg).collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Look up a slot, failing if the index is out of range or the slot is unavailable.
    pub fn get(&self, index: usize) -> Result<Slot, PickError> {
        match self.offsets.get(index) {
            None => Err(PickError::InvalidSlot {
                index,
                len: self.len(),
            }),
            Some(None) => Err(PickError::SlotSkipped(index)),
            Some(Some(offset_deg)) => Ok(Slot {
                offset_deg: *offset_deg,
                elbow_deg: self.elbows[index],
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validation() {
        assert_eq!(
            SlotTable::new(vec![Some(0.0)], vec![]),
            Err(SlotTableError::LengthMismatch {
                offsets: 1,
                elbows: 0
            })
        );
        assert_eq!(SlotTable::new(vec![], vec![]), Err(SlotTableError::Empty));
        assert_eq!(
            SlotTable::new(vec![Some(0.0), Some(f64::NAN)], vec![120.0, 120.0]),
            Err(SlotTableError::NonFinite(1))
        );
    }

    #[test]
    fn test_lookup() {
        let table = SlotTable::new(vec![Some(0.0), None, Some(13.8)], vec![120.0, 121.0, 122.5]).unwrap();

        assert_eq!(
            table.get(2).unwrap(),
            Slot {
                offset_deg: 13.8,
                elbow_deg: 122.5
            }
        );
        assert!(matches!(table.get(1), Err(PickError::SlotSkipped(1))));
        assert!(matches!(
            table.get(3),
            Err(PickError::InvalidSlot { index: 3, len: 3 })
        ));
    }
}
