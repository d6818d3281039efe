use crate::error::{FatAarError, Result};

/// Inclusive SDK level bounds. `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkRange {
    pub min: u32,
    pub max: Option<u32>,
}

impl SdkRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }
}

/// Tightest range satisfying every input: highest minimum, lowest maximum.
pub fn intersect_sdk_ranges(ranges: &[SdkRange]) -> Result<SdkRange> {
    let min = ranges.iter().map(|r| r.min).max().unwrap_or(1);
    let max = ranges.iter().filter_map(|r| r.max).min();

    if let Some(max) = max {
        if min > max {
            return Err(FatAarError::IncompatibleSdkRange { min, max });
        }
    }
    Ok(SdkRange { min, max })
}
