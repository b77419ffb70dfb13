//! JIT configuration types.

/// Page-permission policy for the code buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PagePolicy {
    /// Pages are either writable or executable, never both
    #[default]
    WriteXorExecute,
    /// Pages stay writable and executable (for hosts that allow RWX)
    ReadWriteExecute,
}

/// Configuration for a JIT instance
#[derive(Debug, Clone)]
pub struct JitConfig {
    pub pages: PagePolicy,
    /// Pad superscalar programs to 16-byte boundaries with multi-byte NOPs
    pub align_superscalar: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            pages: PagePolicy::WriteXorExecute,
            align_superscalar: false,
        }
    }
}
