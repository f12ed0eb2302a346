//! Word and variable names.
//!
//! Names are case-insensitive. A [`Name`] stores the upper-cased text along
//! with a packed length + FNV hash, so that walking a long dictionary chain
//! only does a string compare when the cheap tag already matches.

use alloc::string::String;
use core::fmt;
use core::hash::Hasher as _;
use hash32::{FnvHasher, Hasher};

/// A borrowed, not-yet-normalized name, used for lookups.
pub struct NameRef<'a> {
    text: &'a str,
    len_hash: LenHash,
}

impl<'a> NameRef<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            len_hash: LenHash::from_str(text),
        }
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }
}

/// An owned, upper-cased name.
#[derive(Clone, PartialEq, Eq)]
pub struct Name {
    text: String,
    len_hash: LenHash,
}

impl Name {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_ascii_uppercase(),
            len_hash: LenHash::from_str(text),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn matches(&self, other: &NameRef<'_>) -> bool {
        // The hash can collide, so a matching tag still needs the strcmp.
        self.len_hash == other.len_hash && self.text.eq_ignore_ascii_case(other.text)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.text, f)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LenHash {
    // 24..32: 8-bit len (saturating at 255)
    // 00..24: 24-bit FnvHash of the upper-cased bytes
    inner: u32,
}

impl LenHash {
    const HASH_MASK: u32 = 0x00FF_FFFF;

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        let mut hasher = FnvHasher::default();
        for b in s.bytes() {
            hasher.write_u8(b.to_ascii_uppercase());
        }
        let len = s.len().min(255) as u32;
        Self {
            inner: (len << 24) | (hasher.finish32() & Self::HASH_MASK),
        }
    }

    pub fn len(&self) -> usize {
        (self.inner >> 24) as usize
    }

    pub fn raw(&self) -> u32 {
        self.inner
    }
}
