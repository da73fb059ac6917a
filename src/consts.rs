//! Runtime representation parameters

use crate::value::Word;

use std::mem;

/* TAGGED IMMEDIATES */

/// Bits a fixnum payload is shifted past; the tag bits stay clear.
pub const FIXNUM_SHIFT: u32 = 2;

/// Mask selecting the fixnum tag bits.
pub const FIXNUM_MASK: Word = 0b11;

/// Tag of a fixnum.
pub const FIXNUM_TAG: Word = 0b00;

/// Tag OR'd into a heap address to form a pair pointer.
pub const PAIR_TAG: Word = 0b001;

/// Mask selecting the pair tag bits.
pub const PAIR_MASK: Word = 0b111;

/// Bits a character code is shifted past.
pub const CHAR_SHIFT: u32 = 8;

/// Tag of a character.
pub const CHAR_TAG: Word = 0x0F;

/// Mask selecting the character tag bits.
pub const CHAR_MASK: Word = 0xFF;

/// Bits a boolean flag is shifted past.
pub const BOOL_SHIFT: u32 = 7;

/// Tag of a boolean; `0x1F` is false, `0x9F` is true.
pub const BOOL_TAG: Word = 0x1F;

/// Mask selecting the boolean tag bits.
pub const BOOL_MASK: Word = 0x7F;

/// The empty list, a constant.
pub const NIL: Word = 0x2F;

/* MEMORY LAYOUT */

/// Length of a machine word, in bytes.
pub const WORD_SIZE: usize = mem::size_of::<Word>();

/// Bytes occupied by one pair cell: two consecutive words.
pub const PAIR_SIZE: usize = 2 * WORD_SIZE;

/// Displacement from a tagged pair pointer to its `car` word.
pub const CAR_OFFSET: i32 = -(PAIR_TAG as i32);

/// Displacement from a tagged pair pointer to its `cdr` word.
pub const CDR_OFFSET: i32 = WORD_SIZE as i32 - PAIR_TAG as i32;

/* DRIVER DEFAULTS */

/// Default capacity of the executable region, one page.
pub const DEFAULT_CODE_CAPACITY: usize = 4096;

/// Default size of the pair heap, in words.
pub const DEFAULT_HEAP_WORDS: usize = 512;
