//! Font registry.
//!
//! Loaded VBF fonts are kept by name; the first font loaded becomes the
//! default until something else claims it. The framebuffer console and
//! the window system both draw from here.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use meson_vbf::VbfFont;

use crate::loader;
use crate::status::Status;
use crate::sync::SpinLock;

struct Registry {
    fonts: Vec<(String, VbfFont)>,
    default_index: Option<usize>,
}

static FONTS: SpinLock<Registry> = SpinLock::new(Registry {
    fonts: Vec::new(),
    default_index: None,
});

/// Load a VBF font file and register it under `name`.
///
/// Re-loading an existing name replaces the font in place.
///
/// # Errors
///
/// Propagates filesystem errors; [`Status::Invalid`] for a file that is
/// not a VBF font.
pub fn load(path: &str, name: &str) -> Result<(), Status> {
    let data = loader::load_file(path)?;
    let font = VbfFont::parse(&data).map_err(Status::from)?;

    let mut registry = FONTS.lock();
    if let Some(existing) = registry.fonts.iter_mut().find(|(n, _)| n == name) {
        existing.1 = font;
        return Ok(());
    }
    registry.fonts.push((String::from(name), font));
    if registry.default_index.is_none() {
        registry.default_index = Some(registry.fonts.len() - 1);
    }
    Ok(())
}

/// Fetch a registered font by name.
#[must_use]
pub fn get(name: &str) -> Option<VbfFont> {
    let registry = FONTS.lock();
    registry
        .fonts
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, f)| f.clone())
}

/// The default font, if any font has been loaded.
#[must_use]
pub fn get_default() -> Option<VbfFont> {
    let registry = FONTS.lock();
    let index = registry.default_index?;
    registry.fonts.get(index).map(|(_, f)| f.clone())
}

/// Make a registered font the default.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unregistered name.
pub fn set_default(name: &str) -> Result<(), Status> {
    let mut registry = FONTS.lock();
    let index = registry
        .fonts
        .iter()
        .position(|(n, _)| n == name)
        .ok_or(Status::NoSuchEntry)?;
    registry.default_index = Some(index);
    Ok(())
}

/// The pixel width of `text` rendered in a registered font.
///
/// # Errors
///
/// Returns [`Status::NoSuchEntry`] for an unregistered name.
pub fn printed_width(name: &str, text: &str) -> Result<u32, Status> {
    let registry = FONTS.lock();
    let (_, font) = registry
        .fonts
        .iter()
        .find(|(n, _)| n == name)
        .ok_or(Status::NoSuchEntry)?;
    Ok(font.glyph_width * text.chars().count() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{self, FileStream, OpenMode};
    use crate::fs::ramfs::RamFs;
    use alloc::boxed::Box;

    fn store_font(path: &str, name: &str) {
        let mut font = VbfFont::new(name, 8, 8, 8).unwrap();
        let solid = alloc::vec![0xFFu8; font.bytes_per_glyph()];
        font.set_glyph(u32::from('A'), &solid).unwrap();
        let mut stream =
            FileStream::open(path, OpenMode::WRITE | OpenMode::CREATE).unwrap();
        stream.write(&font.write()).unwrap();
        stream.close().unwrap();
    }

    #[test]
    fn load_get_and_default_flow() {
        fs::mount("/f-fonts", Box::new(RamFs::new())).unwrap();
        store_font("/f-fonts/mono.vbf", "mono8");
        store_font("/f-fonts/alt.vbf", "alt8");

        load("/f-fonts/mono.vbf", "mono8").unwrap();
        load("/f-fonts/alt.vbf", "alt8").unwrap();

        assert_eq!(get("mono8").unwrap().name_str(), "mono8");
        assert!(get_default().is_some());

        set_default("alt8").unwrap();
        assert_eq!(get_default().unwrap().name_str(), "alt8");
        assert!(matches!(set_default("ghost"), Err(Status::NoSuchEntry)));

        assert_eq!(printed_width("mono8", "abcd").unwrap(), 32);
    }
}
