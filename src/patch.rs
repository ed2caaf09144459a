//! Binary patch application.
//!
//! A delta-aware [`Source`](crate::Source) can serve a bsdiff patch against
//! the currently installed executable instead of a full image. The apply
//! engine feeds the on-disk file and the downloaded stream through a
//! [`Patcher`] and verifies the signature over the *resulting* image, never
//! over the patch stream itself.

use std::io::{self, Cursor, Read, Write};

use qbsdiff::Bspatch;

/// Capability for applying a binary patch to an old item to produce the
/// updated item.
pub trait Patcher: Send + Sync {
    fn patch(
        &self,
        old: &mut dyn Read,
        new: &mut dyn Write,
        patch: &mut dyn Read,
    ) -> io::Result<()>;
}

/// [`Patcher`] applying patches in the bsdiff 4.x format.
///
/// See <http://www.daemonology.net/bsdiff/> for the algorithm.
pub struct BsDiffPatcher;

impl Patcher for BsDiffPatcher {
    fn patch(
        &self,
        old: &mut dyn Read,
        new: &mut dyn Write,
        patch: &mut dyn Read,
    ) -> io::Result<()> {
        // bspatch needs random access to both inputs, so they are buffered
        // whole; executables fit in memory by the same argument the apply
        // engine already relies on.
        let mut source = Vec::new();
        old.read_to_end(&mut source)?;
        let mut delta = Vec::new();
        patch.read_to_end(&mut delta)?;

        let mut target = Vec::new();
        Bspatch::new(&delta)?.apply(&source, Cursor::new(&mut target))?;
        new.write_all(&target)
    }
}
