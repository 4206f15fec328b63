//! Kernel symbol table.
//!
//! The exception handler resolves stack-trace addresses against this
//! table. It is loaded once from the kernel's own ELF image (shipped as
//! a file on the boot volume) and kept sorted by address so lookup is a
//! binary search for the nearest preceding symbol.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use super::{ExecutableOps, Symbol, elf_exec::ElfOps};
use crate::status::Status;
use crate::sync::SpinLock;

/// An address-sorted symbol table.
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Build a table from unordered symbols.
    #[must_use]
    pub fn new(mut symbols: Vec<Symbol>) -> Self {
        symbols.sort_by_key(|s| s.value);
        Self { symbols }
    }

    /// Extract function symbols from an ELF image.
    ///
    /// # Errors
    ///
    /// Propagates parse errors.
    pub fn from_elf(data: &[u8]) -> Result<Self, Status> {
        let symbols = ElfOps
            .get_symbols(data)?
            .into_iter()
            .filter(|s| s.function)
            .collect();
        Ok(Self::new(symbols))
    }

    /// The number of symbols in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The symbol covering `address`: the nearest one at or below it.
    ///
    /// Returns the symbol and the offset of `address` into it.
    #[must_use]
    pub fn nearest(&self, address: u32) -> Option<(&Symbol, u32)> {
        let index = match self.symbols.binary_search_by_key(&address, |s| s.value) {
            Ok(exact) => exact,
            Err(0) => return None,
            Err(insert) => insert - 1,
        };
        let symbol = &self.symbols[index];
        Some((symbol, address - symbol.value))
    }
}

static KERNEL_SYMBOLS: SpinLock<Option<SymbolTable>> = SpinLock::new(None);

/// Install the kernel's own symbol table from its ELF image.
///
/// # Errors
///
/// Propagates parse errors.
pub fn load_kernel_symbols(elf_data: &[u8]) -> Result<usize, Status> {
    let table = SymbolTable::from_elf(elf_data)?;
    let count = table.len();
    *KERNEL_SYMBOLS.lock() = Some(table);
    crate::kinfo!("loader: {} kernel symbols loaded", count);
    Ok(count)
}

/// Whether the kernel symbol table has been loaded.
#[must_use]
pub fn have_kernel_symbols() -> bool {
    KERNEL_SYMBOLS.lock().is_some()
}

/// Resolve an address against the kernel symbol table.
///
/// Returns the symbol name and offset, or `None` when the table is
/// absent or the address precedes every symbol.
#[must_use]
pub fn resolve_kernel_address(address: u32) -> Option<(String, u32)> {
    let table = KERNEL_SYMBOLS.lock();
    let table = table.as_ref()?;
    let (symbol, offset) = table.nearest(address)?;
    Some((symbol.name.clone(), offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        SymbolTable::new(alloc::vec![
            Symbol {
                name: String::from("late"),
                value: 0x3000,
                size: 0x100,
                function: true,
                global: true,
            },
            Symbol {
                name: String::from("early"),
                value: 0x1000,
                size: 0x100,
                function: true,
                global: true,
            },
            Symbol {
                name: String::from("middle"),
                value: 0x2000,
                size: 0x100,
                function: true,
                global: true,
            },
        ])
    }

    #[test]
    fn nearest_finds_preceding_symbol() {
        let table = table();
        let (symbol, offset) = table.nearest(0x2010).unwrap();
        assert_eq!(symbol.name, "middle");
        assert_eq!(offset, 0x10);
    }

    #[test]
    fn exact_address_matches_with_zero_offset() {
        let table = table();
        let (symbol, offset) = table.nearest(0x1000).unwrap();
        assert_eq!(symbol.name, "early");
        assert_eq!(offset, 0);
    }

    #[test]
    fn address_below_everything_is_none() {
        assert!(table().nearest(0x500).is_none());
    }

    #[test]
    fn address_past_the_end_matches_last() {
        let table = table();
        let (symbol, _) = table.nearest(0xFFFF_0000).unwrap();
        assert_eq!(symbol.name, "late");
    }
}
