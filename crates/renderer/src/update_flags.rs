//! Dirty flags driving the per-frame resource update.
//!
//! Scene edits accumulate into an [`UpdateFlags`] value between frames.
//! Setting a flag escalates to the broader work it implies, so the
//! orchestrator only has to test individual bits:
//!
//! - `SCENE_UPDATE` implies `STATIC_GEOMETRY_UPDATE`, `MATERIAL_UPDATE`,
//!   and `TARGET_RESET`
//! - `STATIC_GEOMETRY_UPDATE` and `MATERIAL_UPDATE` each imply
//!   `TARGET_RESET`, since any visible change invalidates the
//!   accumulated image

use std::fmt;

/// Bit set of pending resource updates.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateFlags(u32);

impl UpdateFlags {
    /// Nothing to do.
    pub const NO_UPDATE: UpdateFlags = UpdateFlags(0);
    /// Instance transforms or placements changed; the top level
    /// acceleration structure and instance mappings must be rebuilt.
    pub const STATIC_GEOMETRY_UPDATE: UpdateFlags = UpdateFlags(1 << 0);
    /// Material parameters changed; the material buffer must be rebuilt.
    pub const MATERIAL_UPDATE: UpdateFlags = UpdateFlags(1 << 1);
    /// A different scene was loaded; everything must be rebuilt.
    pub const SCENE_UPDATE: UpdateFlags = UpdateFlags(1 << 2);
    /// Progressive accumulation must restart from sample zero.
    pub const TARGET_RESET: UpdateFlags = UpdateFlags(1 << 3);

    /// Creates an empty flag set.
    pub fn new() -> Self {
        Self::NO_UPDATE
    }

    /// Sets `flag` along with everything it escalates to.
    pub fn set(&mut self, flag: UpdateFlags) {
        let mut bits = flag.0;
        if flag.contains(Self::SCENE_UPDATE) {
            bits |= Self::STATIC_GEOMETRY_UPDATE.0 | Self::MATERIAL_UPDATE.0 | Self::TARGET_RESET.0;
        }
        if flag.contains(Self::STATIC_GEOMETRY_UPDATE) || flag.contains(Self::MATERIAL_UPDATE) {
            bits |= Self::TARGET_RESET.0;
        }
        self.0 |= bits;
    }

    /// Merges another flag set, applying the same escalation rules.
    pub fn merge(&mut self, other: UpdateFlags) {
        self.set(other);
    }

    /// Returns whether every bit of `flag` is set.
    pub fn contains(&self, flag: UpdateFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Returns whether any bit of `flag` is set.
    pub fn has_any(&self, flag: UpdateFlags) -> bool {
        self.0 & flag.0 != 0
    }

    /// Returns whether no work is pending.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Clears all flags.
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

impl fmt::Debug for UpdateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NO_UPDATE");
        }
        let mut names = Vec::new();
        if self.contains(Self::STATIC_GEOMETRY_UPDATE) {
            names.push("STATIC_GEOMETRY_UPDATE");
        }
        if self.contains(Self::MATERIAL_UPDATE) {
            names.push("MATERIAL_UPDATE");
        }
        if self.contains(Self::SCENE_UPDATE) {
            names.push("SCENE_UPDATE");
        }
        if self.contains(Self::TARGET_RESET) {
            names.push("TARGET_RESET");
        }
        write!(f, "{}", names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_flags_are_empty() {
        let flags = UpdateFlags::new();
        assert!(flags.is_empty());
        assert!(!flags.has_any(UpdateFlags::TARGET_RESET));
    }

    #[test]
    fn geometry_update_escalates_to_target_reset() {
        let mut flags = UpdateFlags::new();
        flags.set(UpdateFlags::STATIC_GEOMETRY_UPDATE);
        assert!(flags.contains(UpdateFlags::STATIC_GEOMETRY_UPDATE));
        assert!(flags.contains(UpdateFlags::TARGET_RESET));
        assert!(!flags.contains(UpdateFlags::MATERIAL_UPDATE));
    }

    #[test]
    fn material_update_escalates_to_target_reset() {
        let mut flags = UpdateFlags::new();
        flags.set(UpdateFlags::MATERIAL_UPDATE);
        assert!(flags.contains(UpdateFlags::TARGET_RESET));
        assert!(!flags.contains(UpdateFlags::STATIC_GEOMETRY_UPDATE));
    }

    #[test]
    fn scene_update_escalates_to_everything() {
        let mut flags = UpdateFlags::new();
        flags.set(UpdateFlags::SCENE_UPDATE);
        assert!(flags.contains(UpdateFlags::STATIC_GEOMETRY_UPDATE));
        assert!(flags.contains(UpdateFlags::MATERIAL_UPDATE));
        assert!(flags.contains(UpdateFlags::TARGET_RESET));
    }

    #[test]
    fn target_reset_alone_does_not_escalate() {
        let mut flags = UpdateFlags::new();
        flags.set(UpdateFlags::TARGET_RESET);
        assert!(flags.contains(UpdateFlags::TARGET_RESET));
        assert!(!flags.has_any(UpdateFlags::STATIC_GEOMETRY_UPDATE));
        assert!(!flags.has_any(UpdateFlags::MATERIAL_UPDATE));
    }

    #[test]
    fn merge_accumulates_across_edits() {
        let mut frame_flags = UpdateFlags::new();
        let mut edit = UpdateFlags::new();
        edit.set(UpdateFlags::MATERIAL_UPDATE);
        frame_flags.merge(edit);
        frame_flags.merge(UpdateFlags::STATIC_GEOMETRY_UPDATE);
        assert!(frame_flags.contains(UpdateFlags::MATERIAL_UPDATE));
        assert!(frame_flags.contains(UpdateFlags::STATIC_GEOMETRY_UPDATE));
        assert!(frame_flags.contains(UpdateFlags::TARGET_RESET));
    }

    #[test]
    fn reset_clears_all_bits() {
        let mut flags = UpdateFlags::new();
        flags.set(UpdateFlags::SCENE_UPDATE);
        flags.reset();
        assert!(flags.is_empty());
    }

    #[test]
    fn debug_lists_set_bits() {
        let mut flags = UpdateFlags::new();
        flags.set(UpdateFlags::MATERIAL_UPDATE);
        let printed = format!("{:?}", flags);
        assert!(printed.contains("MATERIAL_UPDATE"));
        assert!(printed.contains("TARGET_RESET"));
        assert_eq!(format!("{:?}", UpdateFlags::new()), "NO_UPDATE");
    }
}
