//! Keyboard maps.
//!
//! A [`KeyMap`] translates keyboard scan codes to characters through
//! four 256-byte tables: regular, shift, control, and Alt-Gr. Maps are
//! stored as flat files (`"keymap"` magic, a 32-byte name, then the
//! four tables); the byte `0xFF` in any table means "use the universal
//! default" for that scan code.

extern crate alloc;

use alloc::vec::Vec;

use crate::status::Status;

/// Key map file magic.
pub const KEYMAP_MAGIC: &[u8; 8] = b"keymap\0\0";

/// Total size of a key map file.
pub const KEYMAP_FILE_SIZE: usize = 8 + 32 + 4 * 256;

/// Marker byte: fall through to the universal default map.
pub const USE_DEFAULT: u8 = 0xFF;

/// Modifier state for a translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Either shift key held.
    pub shift: bool,
    /// Either control key held.
    pub control: bool,
    /// Alt-Gr held.
    pub alt_gr: bool,
}

/// A scan-code translation map.
#[derive(Clone)]
pub struct KeyMap {
    /// Map name, NUL-padded.
    pub name: [u8; 32],
    /// Unmodified translations.
    pub regular: [u8; 256],
    /// Shifted translations.
    pub shift: [u8; 256],
    /// Control translations.
    pub control: [u8; 256],
    /// Alt-Gr translations.
    pub alt_gr: [u8; 256],
}

impl KeyMap {
    /// The universal default map: a plain US layout for the printable
    /// range of PC scan code set 1.
    #[must_use]
    pub fn universal_default() -> Self {
        let mut map = Self {
            name: [0u8; 32],
            regular: [0u8; 256],
            shift: [0u8; 256],
            control: [0u8; 256],
            alt_gr: [0u8; 256],
        };
        map.name[..2].copy_from_slice(b"US");

        // Scan code set 1, main block.
        const REGULAR: &[(u8, u8)] = &[
            (0x02, b'1'),
            (0x03, b'2'),
            (0x04, b'3'),
            (0x05, b'4'),
            (0x06, b'5'),
            (0x07, b'6'),
            (0x08, b'7'),
            (0x09, b'8'),
            (0x0A, b'9'),
            (0x0B, b'0'),
            (0x0C, b'-'),
            (0x0D, b'='),
            (0x0E, 0x08), // backspace
            (0x0F, b'\t'),
            (0x10, b'q'),
            (0x11, b'w'),
            (0x12, b'e'),
            (0x13, b'r'),
            (0x14, b't'),
            (0x15, b'y'),
            (0x16, b'u'),
            (0x17, b'i'),
            (0x18, b'o'),
            (0x19, b'p'),
            (0x1A, b'['),
            (0x1B, b']'),
            (0x1C, b'\n'),
            (0x1E, b'a'),
            (0x1F, b's'),
            (0x20, b'd'),
            (0x21, b'f'),
            (0x22, b'g'),
            (0x23, b'h'),
            (0x24, b'j'),
            (0x25, b'k'),
            (0x26, b'l'),
            (0x27, b';'),
            (0x28, b'\''),
            (0x29, b'`'),
            (0x2B, b'\\'),
            (0x2C, b'z'),
            (0x2D, b'x'),
            (0x2E, b'c'),
            (0x2F, b'v'),
            (0x30, b'b'),
            (0x31, b'n'),
            (0x32, b'm'),
            (0x33, b','),
            (0x34, b'.'),
            (0x35, b'/'),
            (0x39, b' '),
        ];
        const SHIFTED: &[(u8, u8)] = &[
            (0x02, b'!'),
            (0x03, b'@'),
            (0x04, b'#'),
            (0x05, b'$'),
            (0x06, b'%'),
            (0x07, b'^'),
            (0x08, b'&'),
            (0x09, b'*'),
            (0x0A, b'('),
            (0x0B, b')'),
            (0x0C, b'_'),
            (0x0D, b'+'),
            (0x1A, b'{'),
            (0x1B, b'}'),
            (0x27, b':'),
            (0x28, b'"'),
            (0x29, b'~'),
            (0x2B, b'|'),
            (0x33, b'<'),
            (0x34, b'>'),
            (0x35, b'?'),
        ];

        for &(scan, ch) in REGULAR {
            map.regular[scan as usize] = ch;
        }
        for &(scan, ch) in REGULAR {
            map.shift[scan as usize] = match ch {
                b'a'..=b'z' => ch - 32,
                other => other,
            };
        }
        for &(scan, ch) in SHIFTED {
            map.shift[scan as usize] = ch;
        }
        for &(scan, ch) in REGULAR {
            // Control combinations for letters only.
            if ch.is_ascii_lowercase() {
                map.control[scan as usize] = ch - b'a' + 1;
            }
        }
        map
    }

    /// Parse a key map file.
    ///
    /// # Errors
    ///
    /// Returns [`Status::Invalid`] for a bad magic or a short file.
    pub fn parse(data: &[u8]) -> Result<Self, Status> {
        if data.len() < KEYMAP_FILE_SIZE {
            return Err(Status::Invalid);
        }
        if &data[0..8] != KEYMAP_MAGIC {
            return Err(Status::Invalid);
        }

        let mut map = Self {
            name: [0u8; 32],
            regular: [0u8; 256],
            shift: [0u8; 256],
            control: [0u8; 256],
            alt_gr: [0u8; 256],
        };
        map.name.copy_from_slice(&data[8..40]);
        map.regular.copy_from_slice(&data[40..296]);
        map.shift.copy_from_slice(&data[296..552]);
        map.control.copy_from_slice(&data[552..808]);
        map.alt_gr.copy_from_slice(&data[808..1064]);
        Ok(map)
    }

    /// Serialise the map back to its file form.
    #[must_use]
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(KEYMAP_FILE_SIZE);
        out.extend_from_slice(KEYMAP_MAGIC);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.regular);
        out.extend_from_slice(&self.shift);
        out.extend_from_slice(&self.control);
        out.extend_from_slice(&self.alt_gr);
        out
    }

    /// The map name as a string, trimmed at the first NUL.
    #[must_use]
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(32);
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Translate a scan code under the given modifiers.
    ///
    /// Returns `None` for scan codes with no translation. A table byte
    /// of [`USE_DEFAULT`] falls back to the universal default map.
    #[must_use]
    pub fn translate(&self, scan_code: u8, modifiers: Modifiers) -> Option<u8> {
        let table = if modifiers.alt_gr {
            &self.alt_gr
        } else if modifiers.control {
            &self.control
        } else if modifiers.shift {
            &self.shift
        } else {
            &self.regular
        };

        let ch = table[scan_code as usize];
        if ch == USE_DEFAULT {
            let fallback = Self::universal_default();
            let table = if modifiers.alt_gr {
                &fallback.alt_gr
            } else if modifiers.control {
                &fallback.control
            } else if modifiers.shift {
                &fallback.shift
            } else {
                &fallback.regular
            };
            let ch = table[scan_code as usize];
            return if ch == 0 { None } else { Some(ch) };
        }
        if ch == 0 { None } else { Some(ch) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_translates_letters_and_shift() {
        let map = KeyMap::universal_default();
        assert_eq!(map.translate(0x10, Modifiers::default()), Some(b'q'));
        assert_eq!(
            map.translate(
                0x10,
                Modifiers {
                    shift: true,
                    ..Modifiers::default()
                }
            ),
            Some(b'Q')
        );
        assert_eq!(
            map.translate(
                0x03,
                Modifiers {
                    shift: true,
                    ..Modifiers::default()
                }
            ),
            Some(b'@')
        );
    }

    #[test]
    fn control_combinations_for_letters() {
        let map = KeyMap::universal_default();
        // Ctrl+C is ETX.
        assert_eq!(
            map.translate(
                0x2E,
                Modifiers {
                    control: true,
                    ..Modifiers::default()
                }
            ),
            Some(3)
        );
    }

    #[test]
    fn serialise_parse_round_trips() {
        let map = KeyMap::universal_default();
        let bytes = map.write();
        assert_eq!(bytes.len(), KEYMAP_FILE_SIZE);
        let back = KeyMap::parse(&bytes).unwrap();
        assert_eq!(back.name_str(), "US");
        assert_eq!(back.regular, map.regular);
        assert_eq!(back.shift, map.shift);
        assert_eq!(back.write(), bytes);
    }

    #[test]
    fn default_marker_falls_through() {
        let mut custom = KeyMap::universal_default();
        custom.regular[0x10] = USE_DEFAULT;
        assert_eq!(custom.translate(0x10, Modifiers::default()), Some(b'q'));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = KeyMap::universal_default().write();
        bytes[0] = b'X';
        assert!(matches!(KeyMap::parse(&bytes), Err(Status::Invalid)));
    }

    #[test]
    fn untranslated_scan_code_is_none() {
        let map = KeyMap::universal_default();
        assert_eq!(map.translate(0x80, Modifiers::default()), None);
    }
}
