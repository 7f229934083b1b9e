pub const FILE_SIGNATURE: u32 = 0x4643534d; // "MSCF" stored little-endian

pub const MAX_STRING_SIZE: usize = 255;

// Header flags:
pub const FLAG_PREV_CABINET: u16 = 0x1;
pub const FLAG_NEXT_CABINET: u16 = 0x2;
pub const FLAG_RESERVE_PRESENT: u16 = 0x4;

// Special values of a file entry's folder index:
pub const IFOLD_CONTINUED_FROM_PREV: u16 = 0xfffd;
pub const IFOLD_CONTINUED_TO_NEXT: u16 = 0xfffe;
pub const IFOLD_CONTINUED_PREV_AND_NEXT: u16 = 0xffff;

// File attributes:
pub const ATTR_READ_ONLY: u16 = 0x01;
pub const ATTR_HIDDEN: u16 = 0x02;
pub const ATTR_SYSTEM: u16 = 0x04;
pub const ATTR_ARCH: u16 = 0x20;
pub const ATTR_EXEC: u16 = 0x40;
pub const ATTR_NAME_IS_UTF: u16 = 0x80;
