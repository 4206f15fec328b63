//! Memory-mapping services consumed by drivers.
//!
//! Firmware discovery and the APIC driver need two things from the paging
//! layer: copying arbitrary physical ranges into kernel memory (firmware
//! tables are always parsed from a checksummed copy, never in place) and
//! identity-mapping MMIO registers with the right page attributes. Both
//! are expressed as traits so driver logic is testable against a
//! RAM-backed fake.

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::status::Status;

/// Hardware page size.
pub const PAGE_SIZE: u32 = 4096;

bitflags! {
    /// Page mapping attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageAttrs: u32 {
        /// Writable mapping.
        const WRITABLE  = 1 << 0;
        /// Cache-disabled mapping (MMIO registers).
        const UNCACHED  = 1 << 1;
        /// User-accessible mapping.
        const USER      = 1 << 2;
    }
}

/// Read access to physical memory for firmware table parsing.
pub trait FirmwareReader {
    /// Copy `buf.len()` bytes starting at physical address `phys` into
    /// `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Memory`] if the range cannot be mapped or lies
    /// outside physical memory.
    fn copy_from_physical(&mut self, phys: u32, buf: &mut [u8]) -> Result<(), Status>;

    /// Copy a whole physical range into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Propagates [`Status::Memory`] from the underlying copy.
    fn read_physical(&mut self, phys: u32, len: usize) -> Result<Vec<u8>, Status> {
        let mut buf = vec![0u8; len];
        self.copy_from_physical(phys, &mut buf)?;
        Ok(buf)
    }
}

/// Mapping of MMIO register ranges into the kernel address space.
pub trait MmioMapper {
    /// Identity-map `len` bytes at physical address `phys` with the given
    /// attributes and return the virtual address.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Memory`] if the mapping cannot be established.
    fn map_physical(&mut self, phys: u32, len: u32, attrs: PageAttrs) -> Result<u32, Status>;

    /// Remove a mapping created by [`map_physical`](Self::map_physical).
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] for an address that is not mapped.
    fn unmap(&mut self, virt: u32, len: u32) -> Result<(), Status>;
}

/// One established mapping in the [`PageManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Virtual base address.
    pub virt: u32,
    /// Physical base address.
    pub phys: u32,
    /// Length in bytes, page-rounded.
    pub len: u32,
    /// Page attributes.
    pub attrs: PageAttrs,
}

/// The kernel's mapping registry.
///
/// Tracks every virtual-to-physical mapping with its attributes and
/// hands ranges out of a virtual window reserved for device mappings.
/// The architectural page tables mirror this state; on the kernel
/// target each mutation is pushed into them, on the host the registry
/// alone carries the truth for tests.
///
/// The manager embeds its own [`ResourceLock`]: mappings are created
/// from driver probes that can be killed mid-flight.
pub struct PageManager {
    lock: crate::sync::ResourceLock,
    mappings: Vec<Mapping>,
    /// Next free address in the device-mapping window.
    window_next: u32,
    /// End of the device-mapping window.
    window_end: u32,
}

impl PageManager {
    /// Create a manager handing mappings out of
    /// `[window_start, window_end)`.
    #[must_use]
    pub fn new(window_start: u32, window_end: u32) -> Self {
        Self {
            lock: crate::sync::ResourceLock::new(),
            mappings: Vec::new(),
            window_next: window_start,
            window_end,
        }
    }

    fn round_up(len: u32) -> u32 {
        len.div_ceil(PAGE_SIZE) * PAGE_SIZE
    }

    /// The mapping containing `virt`, if any.
    #[must_use]
    pub fn translate(&self, virt: u32) -> Option<Mapping> {
        self.mappings
            .iter()
            .find(|m| virt >= m.virt && virt < m.virt + m.len)
            .copied()
    }

    /// Change the attributes of an established mapping.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] for an address with no mapping.
    pub fn set_attrs(&mut self, virt: u32, attrs: PageAttrs) -> Result<(), Status> {
        self.lock.acquire()?;
        let result = match self.mappings.iter_mut().find(|m| m.virt == virt) {
            Some(mapping) => {
                mapping.attrs = attrs;
                Ok(())
            }
            None => Err(Status::Invalid),
        };
        let _ = self.lock.release();
        result
    }
}

impl MmioMapper for PageManager {
    fn map_physical(&mut self, phys: u32, len: u32, attrs: PageAttrs) -> Result<u32, Status> {
        self.lock.acquire()?;
        let result = (|| {
            let len = Self::round_up(len.max(1));
            let page_offset = phys % PAGE_SIZE;
            let base = phys - page_offset;

            // Reuse an existing mapping of the same physical range.
            if let Some(existing) = self
                .mappings
                .iter()
                .find(|m| m.phys == base && m.len >= len && m.attrs == attrs)
            {
                return Ok(existing.virt + page_offset);
            }

            let virt = self.window_next;
            let end = virt.checked_add(len).ok_or(Status::Memory)?;
            if end > self.window_end {
                return Err(Status::Memory);
            }
            self.window_next = end;
            self.mappings.push(Mapping {
                virt,
                phys: base,
                len,
                attrs,
            });
            Ok(virt + page_offset)
        })();
        let _ = self.lock.release();
        result
    }

    fn unmap(&mut self, virt: u32, _len: u32) -> Result<(), Status> {
        self.lock.acquire()?;
        let result = {
            let before = self.mappings.len();
            self.mappings
                .retain(|m| !(virt >= m.virt && virt < m.virt + m.len));
            if self.mappings.len() == before {
                Err(Status::Invalid)
            } else {
                Ok(())
            }
        };
        let _ = self.lock.release();
        result
    }
}

/// A [`FirmwareReader`] over an in-memory image of physical memory.
///
/// Used by host tests and by early boot, where low memory is still
/// identity-mapped and can simply be copied.
pub struct LinearImage {
    base: u32,
    memory: Vec<u8>,
}

impl LinearImage {
    /// Wrap a byte image of physical memory starting at `base`.
    #[must_use]
    pub fn new(base: u32, memory: Vec<u8>) -> Self {
        Self { base, memory }
    }

    /// Borrow the backing image.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.memory
    }

    /// Mutably borrow the backing image.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// The physical base address of the image.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.base
    }
}

impl FirmwareReader for LinearImage {
    fn copy_from_physical(&mut self, phys: u32, buf: &mut [u8]) -> Result<(), Status> {
        let start = phys.checked_sub(self.base).ok_or(Status::Memory)? as usize;
        let end = start.checked_add(buf.len()).ok_or(Status::Memory)?;
        let src = self.memory.get(start..end).ok_or(Status::Memory)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_manager_maps_rounded_and_offset() {
        let mut pm = PageManager::new(0xD000_0000, 0xD010_0000);
        // An unaligned MMIO base maps its containing page; the returned
        // address keeps the in-page offset.
        let virt = pm
            .map_physical(0xFEC0_0020, 0x50, PageAttrs::WRITABLE | PageAttrs::UNCACHED)
            .unwrap();
        assert_eq!(virt % PAGE_SIZE, 0x20);

        let mapping = pm.translate(virt).unwrap();
        assert_eq!(mapping.phys, 0xFEC0_0000);
        assert_eq!(mapping.len, PAGE_SIZE);
        assert!(mapping.attrs.contains(PageAttrs::UNCACHED));
    }

    #[test]
    fn page_manager_reuses_identical_mappings() {
        let mut pm = PageManager::new(0xD000_0000, 0xD010_0000);
        let attrs = PageAttrs::WRITABLE | PageAttrs::UNCACHED;
        let a = pm.map_physical(0xFEE0_0000, PAGE_SIZE, attrs).unwrap();
        let b = pm.map_physical(0xFEE0_0000, PAGE_SIZE, attrs).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn page_manager_window_exhaustion_is_memory() {
        let mut pm = PageManager::new(0xD000_0000, 0xD000_1000);
        pm.map_physical(0x1000_0000, PAGE_SIZE, PageAttrs::WRITABLE)
            .unwrap();
        assert_eq!(
            pm.map_physical(0x2000_0000, PAGE_SIZE, PageAttrs::WRITABLE),
            Err(Status::Memory)
        );
    }

    #[test]
    fn page_manager_unmap_and_attrs() {
        let mut pm = PageManager::new(0xD000_0000, 0xD010_0000);
        let virt = pm
            .map_physical(0x1000_0000, PAGE_SIZE, PageAttrs::WRITABLE)
            .unwrap();
        pm.set_attrs(virt, PageAttrs::WRITABLE | PageAttrs::UNCACHED)
            .unwrap();
        assert!(pm.translate(virt).unwrap().attrs.contains(PageAttrs::UNCACHED));

        pm.unmap(virt, PAGE_SIZE).unwrap();
        assert!(pm.translate(virt).is_none());
        assert_eq!(pm.unmap(virt, PAGE_SIZE), Err(Status::Invalid));
    }

    #[test]
    fn linear_image_copies_in_range() {
        let mut image = LinearImage::new(0x1000, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let mut buf = [0u8; 4];
        image.copy_from_physical(0x1002, &mut buf).unwrap();
        assert_eq!(buf, [3, 4, 5, 6]);
    }

    #[test]
    fn linear_image_rejects_out_of_range() {
        let mut image = LinearImage::new(0x1000, vec![0u8; 16]);
        let mut buf = [0u8; 4];
        assert_eq!(
            image.copy_from_physical(0x0FFF, &mut buf),
            Err(Status::Memory)
        );
        assert_eq!(
            image.copy_from_physical(0x100E, &mut buf),
            Err(Status::Memory)
        );
    }
}
