//! Aligned transfer layer: turns arbitrary `(offset, length)` byte
//! requests into whole-unit transfers against the block device. Writes
//! that do not start or end on a unit boundary read the boundary units
//! first and patch them in place.

use crate::block_dev::BlockDevice;
use crate::error::Result;

/// Reads `out.len()` bytes starting at byte `offset`.
pub(crate) fn read_at<D: BlockDevice>(device: &D, offset: u64, out: &mut [u8]) -> Result<()> {
    if out.is_empty() {
        return Ok(());
    }
    let unit = device.unit_size() as u64;
    let first = offset / unit;
    let last = (offset + out.len() as u64).div_ceil(unit);
    let mut scratch = vec![0u8; unit as usize];
    let mut copied = 0usize;

    for unit_id in first..last {
        device.read_unit(unit_id, &mut scratch)?;
        let lo = if unit_id == first {
            (offset % unit) as usize
        } else {
            0
        };
        let take = (unit as usize - lo).min(out.len() - copied);
        out[copied..copied + take].copy_from_slice(&scratch[lo..lo + take]);
        copied += take;
    }
    Ok(())
}

/// Writes `data` starting at byte `offset`.
pub(crate) fn write_at<D: BlockDevice>(device: &D, offset: u64, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let unit = device.unit_size() as u64;
    let first = offset / unit;
    let last = (offset + data.len() as u64).div_ceil(unit);
    let mut scratch = vec![0u8; unit as usize];
    let mut written = 0usize;

    for unit_id in first..last {
        let lo = if unit_id == first {
            (offset % unit) as usize
        } else {
            0
        };
        let take = (unit as usize - lo).min(data.len() - written);
        if take != unit as usize {
            // Partial unit: read-modify-write.
            device.read_unit(unit_id, &mut scratch)?;
        }
        scratch[lo..lo + take].copy_from_slice(&data[written..written + take]);
        device.write_unit(unit_id, &scratch)?;
        written += take;
    }
    Ok(())
}
