//! Utility functions for socket operations

/// Check if running as root
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Check if the platform can send ICMP echo without root
pub fn has_non_root_capability() -> bool {
    // Linux needs ping_group_range configured; macOS allows DGRAM ICMP outright
    cfg!(any(target_os = "linux", target_os = "macos"))
}

/// Build the "run with sudo" hint shown next to permission errors
pub fn sudo_hint() -> String {
    format!(
        "sudo {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    )
}
