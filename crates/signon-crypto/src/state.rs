//! The volume's monotonic setup/teardown state machine (spec.md §3, §4.1).

/// State of the encrypted volume. Transitions are monotonic upward during
/// setup/mount and monotonic downward during teardown; a failure at any
/// setup step rolls back through exactly the states that were reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VolumeState {
    /// No loop device, no mapper, nothing mounted.
    Unmounted,
    /// A loop device points at the backing file.
    LoopSet,
    /// The LUKS container on the loop device has been opened to a mapper.
    LoopLuksOpened,
    /// The mapper's filesystem is mounted at the configured mount path.
    Mounted,
}

impl VolumeState {
    /// Whether secrets can be read/written in this state — spec.md §3:
    /// "The `mounted` state is required for any C2 operation that touches
    /// secrets."
    #[must_use]
    pub fn secrets_available(self) -> bool {
        self == Self::Mounted
    }
}
