use alloc::vec::Vec;
use core::fmt;

use crate::{fastr::Name, Error, Forth, ReplaceErr};

/// The machine's value type. Data stack items, variable cells and compiled
/// body entries are all cells.
pub type Cell = i64;

/// `WordFunc` is the host function behind a native word.
///
/// It gets the whole engine, and reads any inline operands through the
/// current cursor.
pub type WordFunc<T> = fn(&mut Forth<T>) -> Result<(), Error>;

/// The global, never reused numeric address of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code(u32);

impl Code {
    // The first natives of the root segment. Compiled bodies refer to these
    // directly rather than by name, so redefining e.g. `EXIT` can't break
    // already compiled code.
    pub const DOCOL: Code = Code(0);
    pub const EXIT: Code = Code(1);
    pub const LIT: Code = Code(2);
    pub const LITSTRING: Code = Code(3);
    pub const TELL: Code = Code(4);
    pub const BRANCH: Code = Code(5);
    pub const ZBRANCH: Code = Code(6);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn as_cell(self) -> Cell {
        self.0 as Cell
    }
}

impl TryFrom<Cell> for Code {
    type Error = Error;

    fn try_from(cell: Cell) -> Result<Self, Self::Error> {
        u32::try_from(cell)
            .map(Code)
            .replace_err(Error::InvalidCode(cell))
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Index of a dictionary segment in its dictionary's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub(crate) usize);

/// A stable handle to a word: its segment, and its index in that segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WordRef {
    pub segment: SegmentId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const NONE: Flags = Flags(0);
    pub const IMMEDIATE: Flags = Flags(0b01);
    pub const HIDDEN: Flags = Flags(0b10);

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn toggle(&mut self, other: Flags) {
        self.0 ^= other.0;
    }

    pub const fn is_immediate(self) -> bool {
        self.contains(Self::IMMEDIATE)
    }

    pub const fn is_hidden(self) -> bool {
        self.contains(Self::HIDDEN)
    }
}

pub enum WordKind<T: 'static> {
    Native { func: WordFunc<T>, min_depth: u8 },
    Compiled { body: Vec<Cell> },
}

pub struct Word<T: 'static> {
    pub name: Name,
    pub flags: Flags,
    pub kind: WordKind<T>,
}

/// What the engine needs to know to dispatch a word, detached from the
/// dictionary borrow.
pub(crate) enum Dispatch<T: 'static> {
    Native { func: WordFunc<T>, min_depth: u8 },
    Compiled,
}

impl<T: 'static> Word<T> {
    pub fn is_native(&self) -> bool {
        matches!(self.kind, WordKind::Native { .. })
    }

    pub fn body(&self) -> Option<&[Cell]> {
        match &self.kind {
            WordKind::Native { .. } => None,
            WordKind::Compiled { body } => Some(body),
        }
    }

    pub(crate) fn dispatch(&self) -> Dispatch<T> {
        match self.kind {
            WordKind::Native { func, min_depth } => Dispatch::Native { func, min_depth },
            WordKind::Compiled { .. } => Dispatch::Compiled,
        }
    }
}

impl<T: 'static> fmt::Debug for Word<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Word");
        dbg.field("name", &self.name).field("flags", &self.flags);
        match &self.kind {
            WordKind::Native { min_depth, .. } => dbg.field("native_min_depth", min_depth),
            WordKind::Compiled { body } => dbg.field("body", body),
        };
        dbg.finish()
    }
}
