//! The variable store.
//!
//! A flat, append-only vector of cells, plus a map from upper-cased variable
//! names to their addresses. String literals are allotted here too, one
//! character per cell.

use alloc::{collections::BTreeMap, string::String, vec::Vec};

use crate::{word::Cell, Error};

/// Address of `BASE`, the numeric radix used for parsing and printing.
pub const BASE_ADDR: Cell = 0;

pub struct Variables {
    names: BTreeMap<String, Cell>,
    cells: Vec<Cell>,
}

impl Default for Variables {
    fn default() -> Self {
        Self::new()
    }
}

impl Variables {
    pub fn new() -> Self {
        let mut vars = Self {
            names: BTreeMap::new(),
            cells: Vec::new(),
        };
        vars.set("BASE", 10);
        vars
    }

    /// Returns the address of `name`, creating a zeroed cell for it if it
    /// doesn't exist yet.
    pub fn declare(&mut self, name: &str) -> Cell {
        let key = name.to_ascii_uppercase();
        if let Some(addr) = self.names.get(&key) {
            return *addr;
        }
        let addr = self.allot(1);
        self.names.insert(key, addr);
        addr
    }

    pub fn address_of(&self, name: &str) -> Option<Cell> {
        self.names.get(&name.to_ascii_uppercase()).copied()
    }

    pub fn get(&self, name: &str) -> Option<Cell> {
        self.address_of(name).and_then(|addr| self.fetch(addr).ok())
    }

    /// Stores by name. The variable is created on first store.
    pub fn set(&mut self, name: &str, value: Cell) -> Cell {
        let addr = self.declare(name);
        self.cells[addr as usize] = value;
        addr
    }

    pub fn fetch(&self, addr: Cell) -> Result<Cell, Error> {
        let idx = self.index(addr)?;
        Ok(self.cells[idx])
    }

    pub fn store(&mut self, addr: Cell, value: Cell) -> Result<(), Error> {
        let idx = self.index(addr)?;
        self.cells[idx] = value;
        Ok(())
    }

    pub fn base(&self) -> Cell {
        self.cells.first().copied().unwrap_or(10)
    }

    /// Reserves `n` zeroed cells, returning the address of the first.
    pub fn allot(&mut self, n: usize) -> Cell {
        let addr = self.cells.len() as Cell;
        self.cells.resize(self.cells.len() + n, 0);
        addr
    }

    /// Copies `text` into fresh cells, returning `(addr, len)`.
    pub fn allot_str(&mut self, text: &str) -> (Cell, Cell) {
        let addr = self.cells.len() as Cell;
        self.cells.extend(text.chars().map(|c| c as Cell));
        (addr, self.cells.len() as Cell - addr)
    }

    pub fn read_str(&self, addr: Cell, len: Cell) -> Result<String, Error> {
        if len < 0 {
            return Err(Error::InvalidAddress(addr));
        }
        if len == 0 {
            return Ok(String::new());
        }
        let start = self.index(addr)?;
        let last = addr
            .checked_add(len - 1)
            .ok_or(Error::InvalidAddress(addr))?;
        let end = self.index(last)? + 1;
        Ok(self.cells[start..end]
            .iter()
            .map(|c| {
                u32::try_from(*c)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    fn index(&self, addr: Cell) -> Result<usize, Error> {
        usize::try_from(addr)
            .ok()
            .filter(|idx| *idx < self.cells.len())
            .ok_or(Error::InvalidAddress(addr))
    }
}

#[cfg(test)]
mod test {
    use super::{Variables, BASE_ADDR};
    use crate::{word::Cell, Error};

    #[test]
    fn base_is_preset() {
        let vars = Variables::new();
        assert_eq!(vars.address_of("base"), Some(BASE_ADDR));
        assert_eq!(vars.base(), 10);
        assert_eq!(vars.names().collect::<alloc::vec::Vec<_>>(), ["BASE"]);
    }

    #[test]
    fn created_on_first_store() {
        let mut vars = Variables::new();
        assert_eq!(vars.get("x"), None);
        let addr = vars.set("x", 42);
        assert_eq!(vars.get("X"), Some(42));
        assert_eq!(vars.declare("X"), addr);
        assert_eq!(vars.set("x", 5), addr);
        assert_eq!(vars.get("x"), Some(5));
        vars.store(addr, 7).unwrap();
        assert_eq!(vars.fetch(addr), Ok(7));
        assert_eq!(vars.fetch(-1), Err(Error::InvalidAddress(-1)));
        assert_eq!(vars.store(99, 0), Err(Error::InvalidAddress(99)));
    }

    #[test]
    fn strings() {
        let mut vars = Variables::new();
        let (addr, len) = vars.allot_str("hi there");
        assert_eq!(len, 8);
        assert_eq!(vars.read_str(addr, len).unwrap(), "hi there");
        assert_eq!(vars.read_str(addr, 0).unwrap(), "");
        assert_eq!(vars.read_str(addr, 100), Err(Error::InvalidAddress(addr + 99)));
        assert_eq!(vars.read_str(addr, -2), Err(Error::InvalidAddress(addr)));
        assert_eq!(vars.read_str(addr, Cell::MIN), Err(Error::InvalidAddress(addr)));
        assert_eq!(vars.read_str(Cell::MAX, 2), Err(Error::InvalidAddress(Cell::MAX)));
    }
}
