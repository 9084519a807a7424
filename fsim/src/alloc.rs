//! The block allocator.
//!
//! A flat bitmap of length [`NUM_BLOCKS`]; allocation scans for the lowest
//! free slot. No coalescing, no defragmentation.

use fsim_types::{BlockNo, NUM_BLOCKS};

use crate::error::{FsError, FsResult};

/// Allocates the lowest-indexed free block and marks it in use.
pub fn allocate_block(bitmap: &mut [i32; NUM_BLOCKS]) -> FsResult<BlockNo> {
    let Some(index) = bitmap.iter().position(|&used| used == 0) else {
        return Err(FsError::OutOfBlocks);
    };
    bitmap[index] = 1;
    Ok(BlockNo::new(index as i32))
}

/// Frees a previously allocated block.
pub fn free_block(bitmap: &mut [i32; NUM_BLOCKS], block: BlockNo) -> FsResult<()> {
    let Some(index) = block.as_index() else {
        return Err(FsError::InvalidArgument(format!(
            "cannot free unallocated block {block}"
        )));
    };
    if index >= NUM_BLOCKS {
        return Err(FsError::InvalidArgument(format!(
            "block index {index} out of range"
        )));
    }
    bitmap[index] = 0;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_index() {
        let mut bitmap = [0; NUM_BLOCKS];
        bitmap[0] = 1;
        let b = allocate_block(&mut bitmap).unwrap();
        assert_eq!(b.value(), 1);
        assert_eq!(bitmap[1], 1);
    }

    #[test]
    fn free_then_reallocate_reuses_index() {
        let mut bitmap = [0; NUM_BLOCKS];
        let b = allocate_block(&mut bitmap).unwrap();
        free_block(&mut bitmap, b).unwrap();
        let b2 = allocate_block(&mut bitmap).unwrap();
        assert_eq!(b, b2);
    }

    #[test]
    fn exhaustion_reports_out_of_blocks() {
        let mut bitmap = [1; NUM_BLOCKS];
        assert!(matches!(
            allocate_block(&mut bitmap),
            Err(FsError::OutOfBlocks)
        ));
    }

    #[test]
    fn freeing_out_of_range_is_reported_not_fatal() {
        let mut bitmap = [0; NUM_BLOCKS];
        assert!(free_block(&mut bitmap, BlockNo::new(NUM_BLOCKS as i32)).is_err());
    }
}
